//! Shared Score Store
//!
//! The leaderboard only needs four primitives from its backing store:
//! one-shot read, write (with `None` meaning delete), push-id generation
//! and a change subscription. `ScoreStore` captures exactly that, and
//! `MemoryStore` implements it in-process with optional JSON file backing.

use std::future::Future;
use std::path::PathBuf;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::leaderboard::record::RecordId;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing file could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path is not addressable.
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    /// Remote store rejected or dropped the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Full value at a path at one moment; `None` when nothing is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaderboardSnapshot {
    /// Path the snapshot was taken at
    pub path: String,
    /// Value at that path
    pub value: Option<Value>,
}

/// Store contract used by the leaderboard.
///
/// Paths are `/`-separated; leading and trailing slashes are ignored.
pub trait ScoreStore: Send + Sync + 'static {
    /// Read the value at `path` once.
    fn read_once(&self, path: &str) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Replace the value at `path`; `None` deletes it.
    fn write(&self, path: &str, value: Option<Value>) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Produce a fresh, unique child id under `path` without writing.
    fn generate_id(&self, path: &str) -> RecordId;

    /// Watch `path`. The current value is delivered first, then every change.
    fn subscribe(&self, path: &str) -> impl Future<Output = Subscription> + Send;
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Scoped change subscription. Dropping it unsubscribes.
///
/// Only the latest value is retained: a slow consumer skips intermediate
/// states and always sees a full, current snapshot.
#[derive(Debug)]
pub struct Subscription {
    path: String,
    rx: watch::Receiver<Option<Value>>,
    delivered_initial: bool,
}

impl Subscription {
    /// Wrap a watch receiver.
    pub fn new(path: impl Into<String>, rx: watch::Receiver<Option<Value>>) -> Self {
        Self {
            path: path.into(),
            rx,
            delivered_initial: false,
        }
    }

    /// Path being watched.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next snapshot. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<LeaderboardSnapshot> {
        if self.delivered_initial {
            self.rx.changed().await.ok()?;
        }
        self.delivered_initial = true;
        let value = self.rx.borrow_and_update().clone();
        Some(LeaderboardSnapshot {
            path: self.path.clone(),
            value,
        })
    }

    /// Explicitly end the subscription.
    pub fn unsubscribe(self) {
        debug!("Unsubscribed from {}", self.path);
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

struct Watcher {
    segments: Vec<String>,
    tx: watch::Sender<Option<Value>>,
}

/// In-process store holding a single JSON tree.
///
/// With a backing file the whole tree is loaded on open and rewritten
/// after every write, so scores survive restarts.
pub struct MemoryStore {
    root: RwLock<Value>,
    watchers: Mutex<Vec<Watcher>>,
    backing: Option<PathBuf>,
}

impl MemoryStore {
    /// Empty, non-durable store.
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
            watchers: Mutex::new(Vec::new()),
            backing: None,
        }
    }

    /// Open a file-backed store, creating it on first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let root = match tokio::fs::read_to_string(&path).await {
            Ok(text) if !text.trim().is_empty() => serde_json::from_str(&text)?,
            Ok(_) => Value::Object(Map::new()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => return Err(e.into()),
        };
        info!("Opened score store at {}", path.display());

        Ok(Self {
            root: RwLock::new(root),
            watchers: Mutex::new(Vec::new()),
            backing: Some(path),
        })
    }

    async fn persist(&self, root: &Value) -> Result<(), StoreError> {
        let Some(path) = &self.backing else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(root)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn notify(&self, root: &Value, written: &[String]) {
        let mut watchers = self.watchers.lock().await;
        watchers.retain(|w| !w.tx.is_closed());

        for watcher in watchers.iter() {
            if !overlaps(&watcher.segments, written) {
                continue;
            }
            let value = lookup(root, &watcher.segments).cloned();
            watcher.tx.send_replace(value);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreStore for MemoryStore {
    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = segments(path);
        let root = self.root.read().await;
        Ok(lookup(&root, &segments).cloned())
    }

    async fn write(&self, path: &str, value: Option<Value>) -> Result<(), StoreError> {
        let segments = segments(path);
        if segments.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        let mut root = self.root.write().await;
        let mut next = root.clone();
        match value {
            Some(value) => insert(&mut next, &segments, value),
            None => remove(&mut next, &segments),
        }

        // Commit only once the backing file has accepted the change
        self.persist(&next).await?;
        *root = next;
        debug!("Wrote {}", segments.join("/"));

        self.notify(&root, &segments).await;
        Ok(())
    }

    fn generate_id(&self, _path: &str) -> RecordId {
        push_id()
    }

    async fn subscribe(&self, path: &str) -> Subscription {
        let segments = segments(path);
        let root = self.root.read().await;
        let (tx, rx) = watch::channel(lookup(&root, &segments).cloned());

        self.watchers.lock().await.push(Watcher {
            segments: segments.clone(),
            tx,
        });
        debug!("Subscribed to {}", segments.join("/"));

        Subscription::new(segments.join("/"), rx)
    }
}

/// Time-ordered unique id: 12 hex digits of epoch milliseconds followed
/// by 8 random hex digits, so ids sort roughly by creation time.
pub fn push_id() -> RecordId {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let random = uuid::Uuid::new_v4().simple().to_string();
    RecordId(format!("{:012x}{}", millis & 0xFFFF_FFFF_FFFF, &random[..8]))
}

// =============================================================================
// TREE HELPERS
// =============================================================================

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A write at `written` is visible to a watcher at `watched` when one path
/// is a prefix of the other.
fn overlaps(watched: &[String], written: &[String]) -> bool {
    watched.iter().zip(written).all(|(a, b)| a == b)
}

fn lookup<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    match node {
        Value::Object(map) if map.is_empty() => None,
        Value::Null => None,
        other => Some(other),
    }
}

fn insert(root: &mut Value, segments: &[String], value: Value) {
    let mut node = root;
    for segment in segments {
        if !node.is_object() {
            warn!("Overwriting non-object node at {}", segment);
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map.entry(segment.clone()).or_insert(Value::Null);
    }
    *node = value;
}

fn remove(root: &mut Value, segments: &[String]) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let Some(Value::Object(map)) = parents
        .iter()
        .try_fold(&mut *root, |node, segment| node.as_object_mut()?.get_mut(segment))
    else {
        return;
    };
    map.remove(last);

    // Prune parents left empty so deleted branches read back as absent
    if map.is_empty() && !parents.is_empty() {
        remove(root, parents);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_read_delete() {
        let store = MemoryStore::new();

        store.write("scores/a", Some(json!({"x": 1}))).await.unwrap();
        store.write("scores/b", Some(json!({"x": 2}))).await.unwrap();

        let all = store.read_once("scores/").await.unwrap().unwrap();
        assert_eq!(all, json!({"a": {"x": 1}, "b": {"x": 2}}));

        store.write("scores/a", None).await.unwrap();
        store.write("scores/b", None).await.unwrap();
        assert_eq!(store.read_once("scores").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_root_rejected() {
        let store = MemoryStore::new();
        let result = store.write("/", Some(json!(1))).await;
        assert!(matches!(result, Err(StoreError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_subscription_delivers_current_then_changes() {
        let store = MemoryStore::new();
        store.write("scores/a", Some(json!(1))).await.unwrap();

        let mut sub = store.subscribe("scores").await;
        let first = sub.next().await.unwrap();
        assert_eq!(first.value, Some(json!({"a": 1})));

        store.write("scores/b", Some(json!(2))).await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(second.value, Some(json!({"a": 1, "b": 2})));
        assert_eq!(second.path, "scores");
    }

    #[tokio::test]
    async fn test_subscription_ignores_unrelated_paths() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("scores").await;
        assert_eq!(sub.next().await.unwrap().value, None);

        store.write("other/x", Some(json!(1))).await.unwrap();
        store.write("scores/y", Some(json!(2))).await.unwrap();

        let next = sub.next().await.unwrap();
        assert_eq!(next.value, Some(json!({"y": 2})));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let store = MemoryStore::new();
        let sub = store.subscribe("scores").await;
        sub.unsubscribe();

        store.write("scores/a", Some(json!(1))).await.unwrap();
        assert!(store.watchers.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_file_backing_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");

        {
            let store = MemoryStore::open(&path).await.unwrap();
            store.write("scores/a", Some(json!({"score": 3}))).await.unwrap();
        }

        let reopened = MemoryStore::open(&path).await.unwrap();
        let value = reopened.read_once("scores/a").await.unwrap();
        assert_eq!(value, Some(json!({"score": 3})));
    }

    #[test]
    fn test_push_ids_unique_and_sized() {
        let a = push_id();
        let b = push_id();
        assert_ne!(a, b);
        assert_eq!(a.0.len(), 20);
    }
}
