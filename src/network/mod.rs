//! Network Layer
//!
//! WebSocket transport and per-player session control.
//! Round rules live in `game/`; this layer only routes input and clock ticks.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode, RoundView, LeaderboardView};
pub use session::{PlayerSession, RoundTimer, SessionConfig};
pub use server::{GameServer, ServerConfig, GameServerError};
