//! Round State Definitions
//!
//! All state owned by a single round of play. A `GameRound` is a plain
//! value; every mutation goes through the transition functions in
//! `game::engine`.

use serde::{Serialize, Deserialize};

use crate::{BOARD_SIZE, ROUND_SECONDS};

// =============================================================================
// ROUND ID
// =============================================================================

/// Identity of one round within a session.
///
/// Strictly increasing; a tick armed for one round carries its id so it
/// can never be applied to a later round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct RoundId(pub u64);

impl RoundId {
    /// The id of the round that replaces this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "round-{}", self.0)
    }
}

// =============================================================================
// TILES
// =============================================================================

/// Display status of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum TileStatus {
    /// Not yet clicked
    #[default]
    Default,
    /// Clicked in order
    Correct,
    /// Clicked out of order (ends the round)
    Incorrect,
    /// Never reached before the round ended
    GrayedOut,
}

/// A numbered tile on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Face value, 1..=board_size
    pub value: u32,
    /// Current status
    pub status: TileStatus,
}

impl Tile {
    /// Create an unclicked tile.
    pub const fn new(value: u32) -> Self {
        Self { value, status: TileStatus::Default }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Round parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Number of tiles (values 1..=board_size)
    pub board_size: u32,
    /// Time limit in seconds
    pub round_seconds: u32,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            board_size: BOARD_SIZE,
            round_seconds: ROUND_SECONDS,
        }
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// How a round ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every tile found in order
    Win,
    /// Wrong tile clicked
    Loss,
    /// Clock ran out
    Timeout,
}

impl Outcome {
    /// Player-facing message for this outcome.
    pub fn message(self) -> &'static str {
        match self {
            Outcome::Win => "Congratulations! You won!",
            Outcome::Loss => "Wrong number clicked! Game Over.",
            Outcome::Timeout => "Time's Up! Game Over.",
        }
    }
}

/// A finalized `{score, time}` pair, not yet persisted.
///
/// `time` is elapsed seconds, not remaining seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Tiles found in order
    pub score: u32,
    /// Seconds elapsed when the round ended
    pub time: u32,
}

/// Payload emitted when a round terminates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    /// Win, loss or timeout
    pub outcome: Outcome,
    /// Tiles found in order
    pub final_score: u32,
    /// Seconds remaining on the clock
    pub final_time: u32,
    /// Player-facing message
    pub message: String,
}

impl Termination {
    /// Build the termination payload for an outcome.
    pub fn new(outcome: Outcome, final_score: u32, final_time: u32) -> Self {
        Self {
            outcome,
            final_score,
            final_time,
            message: outcome.message().to_string(),
        }
    }

    /// Convert to a leaderboard candidate (remaining time becomes elapsed time).
    pub fn candidate(&self, round_seconds: u32) -> CandidateScore {
        CandidateScore {
            score: self.final_score,
            time: round_seconds.saturating_sub(self.final_time),
        }
    }
}

// =============================================================================
// ROUND
// =============================================================================

/// Lifecycle phase of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Board dealt, clock not running
    Idle,
    /// Clock running, clicks accepted
    Running,
    /// Terminated; only the grey-out pass has touched the board since
    Ended,
}

/// One playthrough from start to termination.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRound {
    /// Round identity (tick guard token)
    pub id: RoundId,
    /// Round parameters
    pub config: RoundConfig,
    /// Board in display order
    pub tiles: Vec<Tile>,
    /// Next value the player must find (1..=board_size + 1)
    pub expected_next: u32,
    /// Seconds left on the clock
    pub remaining_seconds: u32,
    /// Current phase
    pub phase: RoundPhase,
    /// Tile the player was looking for when the round ended
    pub highlight_next: Option<u32>,
    /// Set once the round has ended
    pub termination: Option<Termination>,
}

impl GameRound {
    /// Create an idle round with an unshuffled board.
    ///
    /// The board is shuffled by `engine::start`.
    pub fn new(id: RoundId, config: RoundConfig) -> Self {
        Self {
            id,
            config,
            tiles: (1..=config.board_size).map(Tile::new).collect(),
            expected_next: 1,
            remaining_seconds: config.round_seconds,
            phase: RoundPhase::Idle,
            highlight_next: None,
            termination: None,
        }
    }

    /// Tiles found so far.
    #[inline]
    pub fn found(&self) -> u32 {
        self.expected_next - 1
    }

    /// Is the clock running?
    #[inline]
    pub fn is_running(&self) -> bool {
        self.phase == RoundPhase::Running
    }

    /// Look up a tile by face value.
    pub fn tile(&self, value: u32) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.value == value)
    }

    pub(crate) fn tile_mut(&mut self, value: u32) -> Option<&mut Tile> {
        self.tiles.iter_mut().find(|t| t.value == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_round_is_idle_and_full() {
        let round = GameRound::new(RoundId(1), RoundConfig::default());

        assert_eq!(round.phase, RoundPhase::Idle);
        assert_eq!(round.tiles.len(), 50);
        assert_eq!(round.expected_next, 1);
        assert_eq!(round.remaining_seconds, 60);
        assert!(round.tiles.iter().all(|t| t.status == TileStatus::Default));
    }

    #[test]
    fn test_candidate_uses_elapsed_time() {
        let termination = Termination::new(Outcome::Win, 50, 42);
        let candidate = termination.candidate(60);

        assert_eq!(candidate, CandidateScore { score: 50, time: 18 });
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(Termination::new(Outcome::Loss, 3, 40).message, "Wrong number clicked! Game Over.");
        assert_eq!(Termination::new(Outcome::Timeout, 3, 0).message, "Time's Up! Game Over.");
    }

    #[test]
    fn test_round_id_ordering() {
        let id = RoundId(7);
        assert!(id.next() > id);
        assert_eq!(id.to_string(), "round-7");
    }
}
