//! Round Transitions
//!
//! Pure transition functions over `GameRound`. No clocks, no I/O: the
//! session controller feeds in clicks and ticks, the engine decides.

use thiserror::Error;

use crate::core::rng::DeterministicRng;
use crate::game::state::{
    GameRound, RoundId, RoundPhase, Tile, TileStatus, Outcome, Termination,
};

/// Engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Operation not valid in the current phase.
    #[error("invalid phase: expected {expected:?}, found {actual:?}")]
    InvalidPhase {
        /// Phase the operation requires
        expected: RoundPhase,
        /// Phase the round is in
        actual: RoundPhase,
    },

    /// Clicked value is not on the board.
    #[error("no tile with value {0}")]
    UnknownTile(u32),

    /// Round configuration cannot produce a playable board.
    #[error("invalid round config: {0}")]
    InvalidConfig(&'static str),
}

/// Result of a tile click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickResult {
    /// Round not running; nothing changed.
    Ignored,
    /// Tile was already found; nothing changed.
    AlreadyFound,
    /// Correct tile; round continues.
    Found {
        /// Value just found
        value: u32,
        /// Value to find next
        next: u32,
    },
    /// The click ended the round.
    Ended(Termination),
}

/// Result of a clock tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickResult {
    /// Tick was armed for a different round.
    Stale,
    /// Round not running; nothing changed.
    Ignored,
    /// Clock advanced.
    Running {
        /// Seconds left
        remaining_seconds: u32,
    },
    /// Clock ran out.
    Ended(Termination),
}

/// Deal a fresh board and start the clock.
///
/// Only valid from `Idle`; a finished round must be replaced first.
pub fn start(round: &mut GameRound, rng: &mut DeterministicRng) -> Result<(), EngineError> {
    if round.phase != RoundPhase::Idle {
        return Err(EngineError::InvalidPhase {
            expected: RoundPhase::Idle,
            actual: round.phase,
        });
    }
    if round.config.board_size == 0 {
        return Err(EngineError::InvalidConfig("board_size must be positive"));
    }
    if round.config.round_seconds == 0 {
        return Err(EngineError::InvalidConfig("round_seconds must be positive"));
    }

    round.tiles = rng.deal(round.config.board_size).into_iter().map(Tile::new).collect();
    round.expected_next = 1;
    round.remaining_seconds = round.config.round_seconds;
    round.highlight_next = None;
    round.termination = None;
    round.phase = RoundPhase::Running;

    Ok(())
}

/// Advance the clock by one second.
///
/// `source` is the round the tick was armed for; ticks from any other
/// round are reported as `Stale` and never touch the board.
pub fn tick(round: &mut GameRound, source: RoundId) -> TickResult {
    if source != round.id {
        return TickResult::Stale;
    }
    if !round.is_running() {
        return TickResult::Ignored;
    }

    round.remaining_seconds = round.remaining_seconds.saturating_sub(1);

    if round.remaining_seconds == 0 {
        let final_score = round.found();
        return TickResult::Ended(terminate(round, Outcome::Timeout, final_score, 0));
    }

    TickResult::Running {
        remaining_seconds: round.remaining_seconds,
    }
}

/// Apply a click on the tile showing `value`.
pub fn click_tile(round: &mut GameRound, value: u32) -> Result<ClickResult, EngineError> {
    if !round.is_running() {
        return Ok(ClickResult::Ignored);
    }

    let status = round
        .tile(value)
        .map(|t| t.status)
        .ok_or(EngineError::UnknownTile(value))?;

    if value == round.expected_next {
        set_status(round, value, TileStatus::Correct);
        round.expected_next += 1;

        if round.expected_next > round.config.board_size {
            let (score, time) = (round.config.board_size, round.remaining_seconds);
            return Ok(ClickResult::Ended(terminate(round, Outcome::Win, score, time)));
        }

        return Ok(ClickResult::Found {
            value,
            next: round.expected_next,
        });
    }

    if status == TileStatus::Correct {
        return Ok(ClickResult::AlreadyFound);
    }

    set_status(round, value, TileStatus::Incorrect);
    let (score, time) = (round.found(), round.remaining_seconds);
    Ok(ClickResult::Ended(terminate(round, Outcome::Loss, score, time)))
}

fn set_status(round: &mut GameRound, value: u32, status: TileStatus) {
    if let Some(tile) = round.tile_mut(value) {
        tile.status = status;
    }
}

/// End the round and run the grey-out pass.
fn terminate(round: &mut GameRound, outcome: Outcome, final_score: u32, final_time: u32) -> Termination {
    round.phase = RoundPhase::Ended;

    let next = round.expected_next;
    for tile in round.tiles.iter_mut() {
        if tile.status == TileStatus::Default && tile.value != next {
            tile.status = TileStatus::GrayedOut;
        }
    }
    round.highlight_next = (next <= round.config.board_size).then_some(next);

    let termination = Termination::new(outcome, final_score, final_time);
    round.termination = Some(termination.clone());
    termination
}

// =============================================================================
// TESTS
// =============================================================================
