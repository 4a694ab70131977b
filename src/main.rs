//! Eagle Eye Game Server
//!
//! Serves the number-finding game over WebSocket and keeps the shared
//! top-10 leaderboard.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eagle_eye::{
    VERSION, BOARD_SIZE, ROUND_SECONDS,
    leaderboard::{LeaderboardConfig, LeaderboardManager, MemoryStore},
    network::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("loading configuration")?;

    info!("Eagle Eye Server v{}", VERSION);
    info!("Board: {} tiles, {} seconds", BOARD_SIZE, ROUND_SECONDS);

    let store = match &config.store_path {
        Some(path) => MemoryStore::open(path)
            .await
            .with_context(|| format!("opening score store {}", path.display()))?,
        None => {
            info!("No EAGLE_EYE_STORE_PATH set; scores are kept in memory only");
            MemoryStore::new()
        }
    };
    let manager = LeaderboardManager::new(Arc::new(store), LeaderboardConfig::default());
    let server = Arc::new(GameServer::new(config, manager));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await.context("running server")?;
    info!("Server stopped");

    Ok(())
}
