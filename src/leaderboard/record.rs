//! Score Records and the Ranked Leaderboard
//!
//! Ranking is score descending, then time ascending. Identity for
//! deduplication is the player's initials, never the record id.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::warn;

use crate::game::state::CandidateScore;
use crate::leaderboard::initials::Initials;
use crate::{LEADERBOARD_CAPACITY, LEADERBOARD_DISPLAY};

/// Store-assigned record identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted value at `scores/{id}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Player initials
    pub initials: Initials,
    /// Tiles found in order (0..=50)
    pub score: u32,
    /// Seconds elapsed (0..=60)
    pub time: u32,
}

impl ScoreEntry {
    /// Attach initials to a candidate score.
    pub fn new(initials: Initials, candidate: CandidateScore) -> Self {
        Self {
            initials,
            score: candidate.score,
            time: candidate.time,
        }
    }

    /// Leaderboard order: higher score first, then lower time.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        rank_scores(self.score, self.time, other.score, other.time)
    }

    /// Strictly better than `other` (ties are not better).
    pub fn is_better_than(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Less
    }
}

/// A persisted entry with its store id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Store-assigned id
    pub id: RecordId,
    /// Persisted value
    #[serde(flatten)]
    pub entry: ScoreEntry,
}

impl ScoreRecord {
    /// Total order used for sorting and pruning.
    ///
    /// Exact ties fall back to the record id so every client prunes the
    /// same records.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.entry
            .rank_cmp(&other.entry)
            .then_with(|| self.id.cmp(&other.id))
    }
}

fn rank_scores(score_a: u32, time_a: u32, score_b: u32, time_b: u32) -> Ordering {
    score_b.cmp(&score_a).then(time_a.cmp(&time_b))
}

/// Decode every record under a snapshot of the scores path.
///
/// The snapshot is a JSON object of `id -> {initials, score, time}`;
/// `null` means no records. Malformed children are skipped.
pub fn decode_records(snapshot: Option<&Value>) -> Vec<ScoreRecord> {
    decode_snapshot(snapshot).records
}

/// Every child of a scores snapshot, split by whether it decodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedSnapshot {
    /// Children that decode as `ScoreEntry`
    pub records: Vec<ScoreRecord>,
    /// Children that do not; they still occupy space in the store
    pub malformed: Vec<RecordId>,
}

/// Decode a scores snapshot, keeping the ids of children that fail.
pub fn decode_snapshot(snapshot: Option<&Value>) -> DecodedSnapshot {
    let Some(Value::Object(children)) = snapshot else {
        if let Some(other) = snapshot.filter(|v| !v.is_null()) {
            warn!("Ignoring non-object scores snapshot: {}", other);
        }
        return DecodedSnapshot::default();
    };

    let mut decoded = DecodedSnapshot::default();
    for (id, value) in children {
        match serde_json::from_value::<ScoreEntry>(value.clone()) {
            Ok(entry) => decoded.records.push(ScoreRecord { id: RecordId(id.clone()), entry }),
            Err(e) => {
                warn!("Skipping malformed score record {}: {}", id, e);
                decoded.malformed.push(RecordId(id.clone()));
            }
        }
    }
    decoded
}

/// Keep only the best record per initials.
pub fn best_per_player(records: &[ScoreRecord]) -> Vec<ScoreRecord> {
    let mut best: BTreeMap<Initials, &ScoreRecord> = BTreeMap::new();
    for record in records {
        best.entry(record.entry.initials)
            .and_modify(|current| {
                if record.rank_cmp(*current) == Ordering::Less {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    best.into_values().cloned().collect()
}

// =============================================================================
// LEADERBOARD CACHE
// =============================================================================

/// Leaderboard sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Records kept in the shared store
    pub capacity: usize,
    /// Records shown to players
    pub display: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            capacity: LEADERBOARD_CAPACITY,
            display: LEADERBOARD_DISPLAY,
        }
    }
}

/// Locally cached, ranked view of the shared store.
///
/// Always rebuilt from a full snapshot, never patched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Leaderboard {
    entries: Vec<ScoreRecord>,
    config: LeaderboardConfig,
}

impl Leaderboard {
    /// Empty board.
    pub fn empty(config: LeaderboardConfig) -> Self {
        Self { entries: Vec::new(), config }
    }

    /// Build from arbitrary records: dedup per player, rank, cap.
    pub fn from_records(records: &[ScoreRecord], config: LeaderboardConfig) -> Self {
        let mut entries = best_per_player(records);
        entries.sort_by(ScoreRecord::rank_cmp);
        entries.truncate(config.capacity);
        Self { entries, config }
    }

    /// Build from a raw store snapshot.
    pub fn from_snapshot(snapshot: Option<&Value>, config: LeaderboardConfig) -> Self {
        Self::from_records(&decode_records(snapshot), config)
    }

    /// All ranked entries (at most `capacity`).
    pub fn entries(&self) -> &[ScoreRecord] {
        &self.entries
    }

    /// The entries players get to see.
    pub fn top(&self) -> &[ScoreRecord] {
        let n = self.entries.len().min(self.config.display);
        &self.entries[..n]
    }

    /// Number of ranked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries yet?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Would this candidate make the board?
    ///
    /// Advisory only: checked against this possibly stale cache to decide
    /// whether to ask for initials. The store is re-read on submit.
    pub fn qualifies(&self, candidate: &CandidateScore) -> bool {
        if self.entries.len() < self.config.capacity {
            return true;
        }
        let Some(last) = self.entries.get(self.config.capacity.saturating_sub(1)) else {
            return true;
        };
        rank_scores(candidate.score, candidate.time, last.entry.score, last.entry.time)
            == Ordering::Less
    }
}
