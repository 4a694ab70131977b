//! Leaderboard Reconciliation
//!
//! Read-compare-write against a store that other clients write to
//! concurrently. There is no transaction primitive, so every successful
//! write is followed by a dedup and prune pass over a fresh read. A race
//! can leave at most one extra duplicate visible until the next
//! submission cleans it up.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::game::state::CandidateScore;
use crate::leaderboard::record::{
    decode_snapshot, Leaderboard, LeaderboardConfig, RecordId, ScoreEntry, ScoreRecord,
};
use crate::leaderboard::store::{ScoreStore, StoreError, Subscription};
use crate::SCORES_PATH;

/// Submission failures.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The player's stored record is at least as good.
    #[error("Your current high score is better. Keep trying!")]
    NotBetterThanExisting {
        /// The record that was kept
        existing: ScoreEntry,
    },

    /// A store read or write failed. Nothing was retried.
    #[error("Failed to submit score. Please try again.")]
    PersistenceFailure(#[source] StoreError),
}

/// What a successful submission did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New record for new initials.
    Created,
    /// New record into an empty store.
    FirstEntry,
    /// The player's existing record was overwritten in place.
    Updated,
}

impl SubmitOutcome {
    /// Player-facing message.
    pub fn message(self) -> &'static str {
        match self {
            SubmitOutcome::Created => "New high score submitted successfully!",
            SubmitOutcome::FirstEntry => "First high score submitted successfully!",
            SubmitOutcome::Updated => "New high score! Your previous record has been updated.",
        }
    }
}

/// Report for a successful submission.
#[derive(Clone, Debug)]
pub struct SubmitReport {
    /// Id the entry was written under.
    pub id: RecordId,
    /// Insert or update.
    pub outcome: SubmitOutcome,
    /// Records deleted by the cleanup pass.
    pub removed: Vec<RecordId>,
    /// Cleanup deletes that failed (left for the next submission).
    pub cleanup_failures: usize,
    /// Board as re-derived after cleanup.
    pub leaderboard: Leaderboard,
}

impl SubmitReport {
    /// Did the entry survive the prune?
    pub fn is_ranked(&self) -> bool {
        self.leaderboard.entries().iter().any(|r| r.id == self.id)
    }
}

/// Path of a single record.
pub fn record_path(id: &RecordId) -> String {
    format!("{}/{}", SCORES_PATH, id)
}

/// Records to delete so the store holds one record per player and at
/// most `capacity` records overall.
///
/// Pure planner: ranks everything, keeps the first record seen per
/// initials while there is room, and schedules the rest for deletion.
pub fn plan_cleanup(records: &[ScoreRecord], capacity: usize) -> Vec<RecordId> {
    let mut ranked: Vec<&ScoreRecord> = records.iter().collect();
    ranked.sort_by(|a, b| a.rank_cmp(b));

    let mut seen = BTreeSet::new();
    let mut kept = 0usize;
    let mut removals = Vec::new();

    for record in ranked {
        if !seen.insert(record.entry.initials) {
            removals.push(record.id.clone());
        } else if kept >= capacity {
            removals.push(record.id.clone());
        } else {
            kept += 1;
        }
    }

    removals
}

/// Bounded, per-player-unique leaderboard backed by a shared store.
pub struct LeaderboardManager<S> {
    store: Arc<S>,
    config: LeaderboardConfig,
}

impl<S> Clone for LeaderboardManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config,
        }
    }
}

impl<S: ScoreStore> LeaderboardManager<S> {
    /// Create a manager over `store`.
    pub fn new(store: Arc<S>, config: LeaderboardConfig) -> Self {
        Self { store, config }
    }

    /// Sizing in use.
    pub fn config(&self) -> LeaderboardConfig {
        self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Advisory pre-check against a cached board.
    pub fn evaluate_qualification(&self, candidate: &CandidateScore, current: &Leaderboard) -> bool {
        current.qualifies(candidate)
    }

    /// Watch the scores path.
    pub async fn subscribe(&self) -> Subscription {
        self.store.subscribe(SCORES_PATH).await
    }

    /// One-shot read of the current board.
    pub async fn fetch(&self) -> Result<Leaderboard, StoreError> {
        let snapshot = self.store.read_once(SCORES_PATH).await?;
        Ok(Leaderboard::from_snapshot(snapshot.as_ref(), self.config))
    }

    /// Reconcile a validated entry with the shared store.
    ///
    /// 1. Read every record once.
    /// 2. Same initials present: overwrite in place only if strictly better.
    ///    Otherwise push a new record.
    /// 3. Re-read, delete children that do not decode, and delete
    ///    duplicates per initials, keeping the best.
    /// 4. Delete everything ranked past `capacity`.
    /// 5. Return the re-derived board; subscribers see the store's own
    ///    change notifications.
    #[instrument(skip(self, entry), fields(initials = %entry.initials, score = entry.score, time = entry.time))]
    pub async fn submit(&self, entry: ScoreEntry) -> Result<SubmitReport, SubmitError> {
        let snapshot = self
            .store
            .read_once(SCORES_PATH)
            .await
            .map_err(SubmitError::PersistenceFailure)?;
        let decoded = decode_snapshot(snapshot.as_ref());
        let mut records = decoded.records;

        let existing = records
            .iter()
            .filter(|r| r.entry.initials == entry.initials)
            .min_by(|a, b| a.rank_cmp(b))
            .cloned();

        let (id, outcome) = match existing {
            Some(existing) => {
                if !entry.is_better_than(&existing.entry) {
                    info!("Existing record {} is at least as good", existing.id);
                    return Err(SubmitError::NotBetterThanExisting {
                        existing: existing.entry,
                    });
                }
                (existing.id, SubmitOutcome::Updated)
            }
            None => {
                let outcome = if records.is_empty() {
                    SubmitOutcome::FirstEntry
                } else {
                    SubmitOutcome::Created
                };
                (self.store.generate_id(SCORES_PATH), outcome)
            }
        };

        let value = serde_json::to_value(entry)
            .map_err(|e| SubmitError::PersistenceFailure(e.into()))?;
        if let Err(e) = self.store.write(&record_path(&id), Some(value)).await {
            warn!("Failed to write score {}: {}", id, e);
            return Err(SubmitError::PersistenceFailure(e));
        }
        info!("Score written as {} ({:?})", id, outcome);

        // Other clients may have written since the first read
        let (records, malformed) = match self.store.read_once(SCORES_PATH).await {
            Ok(snapshot) => {
                let decoded = decode_snapshot(snapshot.as_ref());
                (decoded.records, decoded.malformed)
            }
            Err(e) => {
                warn!("Re-read after write failed, re-deriving locally: {}", e);
                records.retain(|r| r.id != id);
                records.push(ScoreRecord { id: id.clone(), entry });
                (records, decoded.malformed)
            }
        };

        // Unreadable children still count against capacity; drop them first
        let mut stale_ids = malformed;
        stale_ids.extend(plan_cleanup(&records, self.config.capacity));

        let mut removed = Vec::new();
        let mut cleanup_failures = 0;
        for stale in stale_ids {
            match self.store.write(&record_path(&stale), None).await {
                Ok(()) => {
                    debug!("Removed score with ID: {}", stale);
                    removed.push(stale);
                }
                Err(e) => {
                    warn!("Failed to remove score {}: {}", stale, e);
                    cleanup_failures += 1;
                }
            }
        }

        let survivors: Vec<ScoreRecord> = records
            .into_iter()
            .filter(|r| !removed.contains(&r.id))
            .collect();

        Ok(SubmitReport {
            id,
            outcome,
            removed,
            cleanup_failures,
            leaderboard: Leaderboard::from_records(&survivors, self.config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::initials::validate_initials;
    use crate::leaderboard::record::decode_records;
    use crate::leaderboard::store::MemoryStore;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn entry(initials: &str, score: u32, time: u32) -> ScoreEntry {
        ScoreEntry {
            initials: validate_initials(initials).unwrap(),
            score,
            time,
        }
    }

    fn manager() -> LeaderboardManager<MemoryStore> {
        LeaderboardManager::new(Arc::new(MemoryStore::new()), LeaderboardConfig::default())
    }

    async fn seed(store: &MemoryStore, id: &str, e: ScoreEntry) {
        store
            .write(&format!("scores/{}", id), Some(serde_json::to_value(e).unwrap()))
            .await
            .unwrap();
    }

    async fn stored(store: &MemoryStore) -> Vec<ScoreRecord> {
        decode_records(store.read_once(SCORES_PATH).await.unwrap().as_ref())
    }

    /// Store whose writes can be switched off.
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    impl ScoreStore for FlakyStore {
        fn read_once(&self, path: &str) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send {
            self.inner.read_once(path)
        }

        async fn write(&self, path: &str, value: Option<Value>) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("offline".into()));
            }
            self.inner.write(path, value).await
        }

        fn generate_id(&self, path: &str) -> RecordId {
            self.inner.generate_id(path)
        }

        fn subscribe(&self, path: &str) -> impl Future<Output = Subscription> + Send {
            self.inner.subscribe(path)
        }
    }

    #[tokio::test]
    async fn test_first_submission() {
        let manager = manager();

        let report = manager.submit(entry("ABC", 30, 10)).await.unwrap();
        assert_eq!(report.outcome, SubmitOutcome::FirstEntry);
        assert!(report.is_ranked());

        let records = stored(manager.store()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, report.id);
    }

    #[tokio::test]
    async fn test_better_time_overwrites_in_place() {
        let manager = manager();
        seed(manager.store(), "existing", entry("ABC", 30, 15)).await;
        seed(manager.store(), "other", entry("XYZ", 10, 15)).await;

        let report = manager.submit(entry("ABC", 30, 10)).await.unwrap();
        assert_eq!(report.outcome, SubmitOutcome::Updated);
        assert_eq!(report.id, RecordId("existing".into()));

        let records = stored(manager.store()).await;
        assert_eq!(records.len(), 2);
        let abc = records.iter().find(|r| r.id.0 == "existing").unwrap();
        assert_eq!(abc.entry.time, 10);
    }

    #[tokio::test]
    async fn test_worse_time_rejected_without_mutation() {
        let manager = manager();
        seed(manager.store(), "existing", entry("ABC", 30, 15)).await;

        let result = manager.submit(entry("ABC", 30, 20)).await;
        match result {
            Err(SubmitError::NotBetterThanExisting { existing }) => {
                assert_eq!(existing, entry("ABC", 30, 15));
            }
            other => panic!("expected rejection, got {:?}", other.map(|r| r.outcome)),
        }

        let records = stored(manager.store()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry.time, 15);
    }

    #[tokio::test]
    async fn test_equal_result_rejected() {
        let manager = manager();
        seed(manager.store(), "existing", entry("ABC", 30, 15)).await;

        let result = manager.submit(entry("ABC", 30, 15)).await;
        assert!(matches!(result, Err(SubmitError::NotBetterThanExisting { .. })));
    }

    #[tokio::test]
    async fn test_new_initials_created() {
        let manager = manager();
        seed(manager.store(), "a", entry("AAA", 5, 5)).await;

        let report = manager.submit(entry("BBB", 6, 6)).await.unwrap();
        assert_eq!(report.outcome, SubmitOutcome::Created);
        assert_eq!(stored(manager.store()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_duplicates() {
        let manager = manager();
        // Two near-simultaneous submissions slipped in under the same initials
        seed(manager.store(), "dup1", entry("ABC", 20, 30)).await;
        seed(manager.store(), "dup2", entry("ABC", 25, 30)).await;

        let report = manager.submit(entry("QQQ", 1, 1)).await.unwrap();
        assert_eq!(report.removed, vec![RecordId("dup1".into())]);

        let records = stored(manager.store()).await;
        let abc: Vec<_> = records.iter().filter(|r| r.entry.initials.as_str() == "ABC").collect();
        assert_eq!(abc.len(), 1);
        assert_eq!(abc[0].entry.score, 25);
    }

    #[tokio::test]
    async fn test_prunes_to_capacity() {
        let manager = manager();
        let names = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF", "GGG", "HHH", "III", "JJJ"];
        for (i, name) in names.iter().enumerate() {
            seed(manager.store(), &format!("id{}", i), entry(name, 20 + i as u32, 30)).await;
        }

        let report = manager.submit(entry("KKK", 40, 30)).await.unwrap();
        assert_eq!(report.removed, vec![RecordId("id0".into())]);
        assert!(report.is_ranked());

        let records = stored(manager.store()).await;
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.entry.initials.as_str() != "AAA"));
    }

    #[tokio::test]
    async fn test_unreadable_records_count_against_capacity() {
        let manager = manager();
        let names = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF", "GGG", "HHH", "III", "JJJ"];
        for (i, name) in names.iter().enumerate() {
            seed(manager.store(), &format!("id{}", i), entry(name, 20 + i as u32, 30)).await;
        }
        manager
            .store()
            .write("scores/zz", Some(json!({"initials": "ZZZ", "score": 12.5, "time": 30})))
            .await
            .unwrap();
        manager.store().write("scores/bad", Some(json!("garbage"))).await.unwrap();

        let report = manager.submit(entry("KKK", 45, 10)).await.unwrap();
        assert!(report.is_ranked());
        assert!(report.removed.contains(&RecordId("zz".into())));
        assert!(report.removed.contains(&RecordId("bad".into())));

        let raw = manager.store().read_once(SCORES_PATH).await.unwrap().unwrap();
        let children = raw.as_object().unwrap();
        assert_eq!(children.len(), 10);
        assert!(!children.contains_key("zz"));
        assert!(!children.contains_key("bad"));
    }

    #[tokio::test]
    async fn test_low_score_pruned_immediately() {
        let manager = manager();
        let names = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF", "GGG", "HHH", "III", "JJJ"];
        for (i, name) in names.iter().enumerate() {
            seed(manager.store(), &format!("id{}", i), entry(name, 20 + i as u32, 30)).await;
        }

        // Stale cache said it qualified; the store disagrees
        let report = manager.submit(entry("KKK", 1, 60)).await.unwrap();
        assert!(!report.is_ranked());
        assert_eq!(report.removed, vec![report.id.clone()]);
        assert_eq!(stored(manager.store()).await.len(), 10);
    }

    #[tokio::test]
    async fn test_write_failure_reported() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail_writes: AtomicBool::new(true),
        });
        let manager = LeaderboardManager::new(store.clone(), LeaderboardConfig::default());

        let result = manager.submit(entry("ABC", 10, 10)).await;
        assert!(matches!(result, Err(SubmitError::PersistenceFailure(StoreError::Unavailable(_)))));
        assert_eq!(store.inner.read_once(SCORES_PATH).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_invariants_hold_over_many_submissions() {
        let manager = manager();
        let players = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF", "GGG", "HHH", "III", "JJJ", "KKK", "LLL"];

        for round in 0..5u32 {
            for (i, name) in players.iter().enumerate() {
                let score = (i as u32 * 7 + round * 3) % 51;
                let _ = manager.submit(entry(name, score, 60 - round)).await;

                let records = stored(manager.store()).await;
                assert!(records.len() <= 10);
                let mut per_player: BTreeMap<String, usize> = BTreeMap::new();
                for r in &records {
                    *per_player.entry(r.entry.initials.to_string()).or_default() += 1;
                }
                assert!(per_player.values().all(|&n| n == 1));
            }
        }
    }

    #[test]
    fn test_plan_cleanup() {
        let rec = |id: &str, initials: &str, score: u32| ScoreRecord {
            id: RecordId(id.into()),
            entry: entry(initials, score, 10),
        };
        let records = vec![
            rec("a", "AAA", 10),
            rec("b", "AAA", 12),
            rec("c", "BBB", 11),
            rec("d", "CCC", 1),
        ];

        let removals = plan_cleanup(&records, 2);
        assert_eq!(removals, vec![RecordId("a".into()), RecordId("d".into())]);
        assert!(plan_cleanup(&records[2..], 10).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_and_qualification() {
        let manager = manager();
        seed(manager.store(), "a", entry("AAA", 5, 5)).await;
        manager.store().write("scores/bad", Some(json!("garbage"))).await.unwrap();

        let board = manager.fetch().await.unwrap();
        assert_eq!(board.len(), 1);
        assert!(manager.evaluate_qualification(&CandidateScore { score: 0, time: 60 }, &board));
    }
}
