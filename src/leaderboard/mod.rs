//! Leaderboard Module
//!
//! Shared top-N scores with one record per player.
//!
//! ## Module Structure
//!
//! - `initials`: Initials validation and denylist
//! - `record`: Score records, ranking, cached `Leaderboard`
//! - `store`: Store contract, subscriptions, `MemoryStore`
//! - `manager`: Submission reconciliation (dedup + prune)

pub mod initials;
pub mod record;
pub mod store;
pub mod manager;

// Re-export key types
pub use initials::{validate_initials, Initials, InitialsError};
pub use record::{DecodedSnapshot, Leaderboard, LeaderboardConfig, RecordId, ScoreEntry, ScoreRecord};
pub use store::{MemoryStore, ScoreStore, LeaderboardSnapshot, StoreError, Subscription};
pub use manager::{LeaderboardManager, SubmitError, SubmitOutcome, SubmitReport};
