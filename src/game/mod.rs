//! Game Engine Module
//!
//! Round state and its transitions. Pure: no clocks, no I/O.
//!
//! ## Module Structure
//!
//! - `state`: Tiles, rounds, outcomes, termination payload
//! - `engine`: `start`, `tick`, `click_tile` transitions

pub mod state;
pub mod engine;

// Re-export key types
pub use state::{
    GameRound, RoundId, RoundPhase, RoundConfig, Tile, TileStatus,
    Outcome, Termination, CandidateScore,
};
pub use engine::{ClickResult, TickResult, EngineError};
