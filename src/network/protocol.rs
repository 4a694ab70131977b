//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::game::state::{GameRound, Outcome, RoundPhase, TileStatus, Termination};
use crate::leaderboard::record::Leaderboard;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a round (resets a finished one first).
    Start,

    /// Abandon the current round and deal a fresh idle board.
    Reset,

    /// Player clicked the tile showing `value`.
    ClickTile {
        /// Face value of the clicked tile
        value: u32,
    },

    /// Initials for the pending leaderboard candidate.
    SubmitInitials {
        /// Raw initials as typed
        initials: String,
    },

    /// Show or hide the leaderboard.
    ToggleLeaderboard,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp (ms)
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full board state.
    Round(RoundView),

    /// Clock update.
    Tick {
        /// Round the tick belongs to
        round_id: u64,
        /// Seconds left
        remaining_seconds: u32,
    },

    /// Round terminated.
    RoundEnded(RoundEndInfo),

    /// Result of an initials submission.
    SubmitResult {
        /// Score was written
        accepted: bool,
        /// Player-facing message
        message: String,
    },

    /// Leaderboard contents and visibility.
    Leaderboard(LeaderboardView),

    /// Pong response.
    Pong {
        /// Echoed client timestamp
        timestamp: u64,
        /// Server time (ms since epoch)
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why
        reason: String,
    },
}

/// Tile as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileView {
    /// Face value
    pub value: u32,
    /// Display status
    pub status: TileStatus,
    /// Presentation hint: the tile the player was looking for
    pub highlight: bool,
}

/// Board snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundView {
    /// Round identity
    pub round_id: u64,
    /// Current phase
    pub phase: RoundPhase,
    /// Seconds left
    pub remaining_seconds: u32,
    /// Tiles found so far
    pub found: u32,
    /// Tiles in display order
    pub tiles: Vec<TileView>,
}

impl From<&GameRound> for RoundView {
    fn from(round: &GameRound) -> Self {
        Self {
            round_id: round.id.0,
            phase: round.phase,
            remaining_seconds: round.remaining_seconds,
            found: round.found(),
            tiles: round
                .tiles
                .iter()
                .map(|t| TileView {
                    value: t.value,
                    status: t.status,
                    highlight: round.highlight_next == Some(t.value),
                })
                .collect(),
        }
    }
}

/// Round termination details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundEndInfo {
    /// Round identity
    pub round_id: u64,
    /// Win, loss or timeout
    pub outcome: Outcome,
    /// Tiles found in order
    pub final_score: u32,
    /// Seconds remaining
    pub final_time: u32,
    /// Player-facing message
    pub message: String,
    /// Prompt for initials?
    pub qualifies: bool,
}

impl RoundEndInfo {
    /// Build from a termination payload.
    pub fn new(round_id: u64, termination: &Termination, qualifies: bool, message: String) -> Self {
        Self {
            round_id,
            outcome: termination.outcome,
            final_score: termination.final_score,
            final_time: termination.final_time,
            message,
            qualifies,
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// 1-based rank
    pub rank: u32,
    /// Player initials
    pub initials: String,
    /// Tiles found
    pub score: u32,
    /// Seconds elapsed
    pub time: u32,
}

/// Leaderboard contents as shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardView {
    /// Panel is open
    pub visible: bool,
    /// Displayed rows (top entries only)
    pub entries: Vec<LeaderboardRow>,
}

impl LeaderboardView {
    /// Build the displayed rows from a cached board.
    pub fn new(board: &Leaderboard, visible: bool) -> Self {
        Self {
            visible,
            entries: board
                .top()
                .iter()
                .enumerate()
                .map(|(i, r)| LeaderboardRow {
                    rank: i as u32 + 1,
                    initials: r.entry.initials.to_string(),
                    score: r.entry.score,
                    time: r.entry.time,
                })
                .collect(),
        }
    }
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidInput,
    /// Operation not valid in the current phase.
    InvalidPhase,
    /// No tile with that value.
    UnknownTile,
    /// Initials rejected (format or denylist).
    InvalidInitials,
    /// No finished, qualifying round awaiting initials.
    NothingToSubmit,
    /// Server is at its connection limit.
    ServerFull,
    /// Internal error.
    Internal,
}

impl ServerError {
    /// Build an error payload.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{RoundConfig, RoundId};

    #[test]
    fn test_client_message_wire_format() {
        let msg = ClientMessage::from_json(r#"{"type":"click_tile","value":7}"#).unwrap();
        assert_eq!(msg, ClientMessage::ClickTile { value: 7 });

        let msg = ClientMessage::from_json(r#"{"type":"submit_initials","initials":"abc"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SubmitInitials { initials: "abc".into() });

        assert_eq!(ClientMessage::Start.to_json().unwrap(), r#"{"type":"start"}"#);
        assert!(ClientMessage::from_json(r#"{"type":"fly"}"#).is_err());
    }

    #[test]
    fn test_round_view_marks_highlight() {
        let mut round = GameRound::new(RoundId(3), RoundConfig::default());
        round.highlight_next = Some(4);

        let view = RoundView::from(&round);
        assert_eq!(view.round_id, 3);
        assert_eq!(view.tiles.len(), 50);
        assert_eq!(view.tiles.iter().filter(|t| t.highlight).count(), 1);

        let json = ServerMessage::Round(view).to_json().unwrap();
        assert!(json.contains("\"type\":\"round\""));
        assert!(json.contains("\"phase\":\"idle\""));
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::error(ErrorCode::InvalidInitials, "nope");
        let json = msg.to_json().unwrap();
        assert!(json.contains("invalid_initials"));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }
}
