//! WebSocket Game Server
//!
//! Async WebSocket server. Each connection gets its own `PlayerSession`;
//! all sessions share one `LeaderboardManager` and therefore one store.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::state::{RoundConfig, RoundId};
use crate::leaderboard::manager::LeaderboardManager;
use crate::leaderboard::store::ScoreStore;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::network::session::{PlayerSession, SessionConfig};
use crate::TICK_INTERVAL_MS;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// JSON file backing the score store; in-memory only when unset.
    pub store_path: Option<PathBuf>,
    /// Round clock period.
    pub tick_interval: Duration,
    /// Board size and time limit.
    pub round: RoundConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            store_path: None,
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            round: RoundConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `EAGLE_EYE_*` environment variables.
    pub fn from_env() -> Result<Self, GameServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("EAGLE_EYE_BIND") {
            config.bind_addr = bind
                .parse()
                .map_err(|_| GameServerError::Config(format!("EAGLE_EYE_BIND: bad address {:?}", bind)))?;
        }
        if let Some(max) = lookup("EAGLE_EYE_MAX_CONNECTIONS") {
            config.max_connections = max
                .parse()
                .map_err(|_| GameServerError::Config(format!("EAGLE_EYE_MAX_CONNECTIONS: not a number {:?}", max)))?;
        }
        if let Some(ms) = lookup("EAGLE_EYE_TICK_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| GameServerError::Config(format!("EAGLE_EYE_TICK_MS: not a number {:?}", ms)))?;
            if ms == 0 {
                return Err(GameServerError::Config("EAGLE_EYE_TICK_MS must be positive".into()));
            }
            config.tick_interval = Duration::from_millis(ms);
        }
        config.store_path = lookup("EAGLE_EYE_STORE_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            round: self.round,
            tick_interval: self.tick_interval,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Bad configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Connected client bookkeeping.
struct ConnectedClient {
    connected_at: Instant,
}

/// The game server.
pub struct GameServer<S> {
    config: ServerConfig,
    manager: LeaderboardManager<S>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: ScoreStore> GameServer<S> {
    /// Create a new game server.
    pub fn new(config: ServerConfig, manager: LeaderboardManager<S>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            manager,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Eagle Eye {} listening on {}", self.config.version, listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(reject(stream, addr));
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let manager = self.manager.clone();
        let session_config = self.config.session_config();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let (tick_tx, mut tick_rx) = mpsc::channel::<RoundId>(8);

            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    connected_at: Instant::now(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut session = PlayerSession::new(manager.clone(), tick_tx, session_config);
            let mut subscription = manager.subscribe().await;
            let mut store_open = true;
            let _ = msg_tx.send(session.round_view()).await;

            'connection: loop {
                let outgoing = tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => handle_client_message(&mut session, client_msg).await,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        vec![ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format")]
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break 'connection;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break 'connection;
                            }
                            _ => Vec::new(),
                        }
                    }
                    Some(round) = tick_rx.recv() => session.on_tick(round),
                    snapshot = subscription.next(), if store_open => {
                        match snapshot {
                            Some(snapshot) => session.on_snapshot(snapshot),
                            None => {
                                warn!("Score store closed; leaderboard for {} is frozen", addr);
                                store_open = false;
                                Vec::new()
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break 'connection;
                    }
                };

                if !forward(&msg_tx, outgoing).await {
                    debug!("Writer for {} is gone", addr);
                    break 'connection;
                }
            }

            // Cleanup
            drop(session);
            subscription.unsubscribe();
            drop(msg_tx);
            let _ = sender_task.await;

            if let Some(client) = clients.write().await.remove(&addr) {
                info!("Client {} cleaned up after {:?}", addr, client.connected_at.elapsed());
            }
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Route one client message through the session.
async fn handle_client_message<S: ScoreStore>(
    session: &mut PlayerSession<S>,
    msg: ClientMessage,
) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::Start => session.start(),
        ClientMessage::Reset => session.reset(),
        ClientMessage::ClickTile { value } => session.click_tile(value),
        ClientMessage::SubmitInitials { initials } => session.submit_initials(&initials).await,
        ClientMessage::ToggleLeaderboard => session.toggle_leaderboard(),
        ClientMessage::Ping { timestamp } => vec![ServerMessage::Pong {
            timestamp,
            server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }],
    }
}

/// Queue messages for the socket writer. `false` once the writer is gone.
async fn forward(tx: &mpsc::Sender<ServerMessage>, outgoing: Vec<ServerMessage>) -> bool {
    for msg in outgoing {
        if tx.send(msg).await.is_err() {
            return false;
        }
    }
    true
}

/// Complete the handshake only to tell the client the server is full.
async fn reject(stream: TcpStream, addr: SocketAddr) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let msg = ServerMessage::error(ErrorCode::ServerFull, "Server is full. Please try again later.");
    if let Ok(text) = msg.to_json() {
        let _ = ws.send(Message::Text(text)).await;
    }
    let _ = ws.close(None).await;
    debug!("Rejected {}", addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::RoundPhase;
    use crate::leaderboard::record::LeaderboardConfig;
    use crate::leaderboard::store::MemoryStore;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn server(config: ServerConfig) -> Arc<GameServer<MemoryStore>> {
        let manager = LeaderboardManager::new(Arc::new(MemoryStore::new()), LeaderboardConfig::default());
        Arc::new(GameServer::new(config, manager))
    }

    async fn spawn(config: ServerConfig) -> (Arc<GameServer<MemoryStore>>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = server(config);
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, addr)
    }

    async fn recv(ws: &mut Client) -> ServerMessage {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return ServerMessage::from_json(&text).unwrap(),
                _ => continue,
            }
        }
    }

    async fn send(ws: &mut Client, msg: ClientMessage) {
        ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = ServerConfig::from_lookup(|key| match key {
            "EAGLE_EYE_BIND" => Some("127.0.0.1:9000".into()),
            "EAGLE_EYE_MAX_CONNECTIONS" => Some("5".into()),
            "EAGLE_EYE_STORE_PATH" => Some("/tmp/scores.json".into()),
            "EAGLE_EYE_TICK_MS" => Some("250".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/scores.json")));
        assert_eq!(config.tick_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let bad_bind = ServerConfig::from_lookup(|key| (key == "EAGLE_EYE_BIND").then(|| "nowhere".into()));
        assert!(matches!(bad_bind, Err(GameServerError::Config(_))));

        let zero_tick = ServerConfig::from_lookup(|key| (key == "EAGLE_EYE_TICK_MS").then(|| "0".into()));
        assert!(matches!(zero_tick, Err(GameServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = server(ServerConfig::default());
        assert_eq!(server.connection_count().await, 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_play_over_websocket() {
        let (server, addr) = spawn(ServerConfig::default()).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let ServerMessage::Round(view) = recv(&mut ws).await else {
            panic!("expected initial board");
        };
        assert_eq!(view.phase, RoundPhase::Idle);

        send(&mut ws, ClientMessage::Start).await;
        send(&mut ws, ClientMessage::Ping { timestamp: 7 }).await;

        let mut started = false;
        let mut ponged = false;
        while !(started && ponged) {
            match recv(&mut ws).await {
                ServerMessage::Round(view) if view.phase == RoundPhase::Running => started = true,
                ServerMessage::Pong { timestamp, .. } => {
                    assert_eq!(timestamp, 7);
                    ponged = true;
                }
                _ => {}
            }
        }

        ws.send(Message::Text("not json".into())).await.unwrap();
        loop {
            if let ServerMessage::Error(e) = recv(&mut ws).await {
                assert_eq!(e.code, ErrorCode::InvalidInput);
                break;
            }
        }

        server.shutdown();
        loop {
            if let ServerMessage::Shutdown { .. } = recv(&mut ws).await {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_forward_stops_when_writer_gone() {
        let (tx, mut rx) = mpsc::channel(4);
        let pong = ServerMessage::Pong { timestamp: 1, server_time: 2 };

        assert!(forward(&tx, vec![pong.clone()]).await);
        assert_eq!(rx.recv().await, Some(pong.clone()));

        drop(rx);
        assert!(!forward(&tx, vec![pong]).await);
        assert!(forward(&tx, Vec::new()).await);
    }

    #[tokio::test]
    async fn test_client_tracked_until_disconnect() {
        let (server, addr) = spawn(ServerConfig::default()).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let ServerMessage::Round(_) = recv(&mut ws).await else {
            panic!("expected initial board");
        };
        assert_eq!(server.connection_count().await, 1);

        ws.close(None).await.unwrap();
        for _ in 0..200 {
            if server.connection_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.connection_count().await, 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = ServerConfig {
            max_connections: 0,
            ..Default::default()
        };
        let (server, addr) = spawn(config).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let ServerMessage::Error(e) = recv(&mut ws).await else {
            panic!("expected rejection");
        };
        assert_eq!(e.code, ErrorCode::ServerFull);
        assert_eq!(server.connection_count().await, 0);
    }
}
