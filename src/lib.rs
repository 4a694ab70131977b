//! # Eagle Eye Game Server
//!
//! Find the numbers 1 to 50 in ascending order within 60 seconds, then
//! compete for a place on a shared top-10 leaderboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    EAGLE EYE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seeded Xorshift128+ (board shuffles)      │
//! │                                                              │
//! │  game/           - Round logic (pure)                        │
//! │  ├── state.rs    - Tiles, rounds, termination payload        │
//! │  └── engine.rs   - start / tick / click_tile transitions     │
//! │                                                              │
//! │  leaderboard/    - Shared top-10                             │
//! │  ├── initials.rs - Initials validation + denylist            │
//! │  ├── record.rs   - Records, ranking, cached board            │
//! │  ├── store.rs    - Store contract + in-memory store          │
//! │  └── manager.rs  - Submit: write, dedup, prune               │
//! │                                                              │
//! │  network/        - Sessions and transport                    │
//! │  ├── session.rs  - Per-player controller + round timer       │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! The store is shared with other clients and has no transactions.
//! Submissions read, compare, write, then re-read and delete duplicates
//! and overflow. Any race is corrected by the next submission.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod leaderboard;
pub mod network;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use game::state::{GameRound, RoundId, RoundPhase, Outcome, Termination, CandidateScore};
pub use leaderboard::{Leaderboard, LeaderboardManager, MemoryStore, ScoreStore, validate_initials};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tiles on the board (values 1..=50)
pub const BOARD_SIZE: u32 = 50;

/// Round time limit in seconds
pub const ROUND_SECONDS: u32 = 60;

/// Records kept in the shared store
pub const LEADERBOARD_CAPACITY: usize = 10;

/// Records shown to players
pub const LEADERBOARD_DISPLAY: usize = 6;

/// Clock tick interval in milliseconds
pub const TICK_INTERVAL_MS: u64 = 1000;

/// Store path holding `id -> {initials, score, time}`
pub const SCORES_PATH: &str = "scores";
