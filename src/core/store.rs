//! Snapshot persistence with crash recovery.
//!
//! The store writes the whole ledger plus counters as one JSON document:
//! - Fixed-interval, wholesale writes (not an append log); the loss
//!   window equals the persistence interval.
//! - Before overwriting the primary file, the previous primary is copied
//!   to a backup path so a write torn by a crash still leaves one
//!   readable snapshot behind.
//! - `load` and `persist` never propagate failures; every storage fault
//!   degrades to continued in-memory operation with logging.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::item::QueueItem;
use crate::core::now_ms;
use crate::core::stats::CountersSnapshot;

/// The persisted unit: full ledger + counters at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub queue: Vec<QueueItem>,
    pub stats: CountersSnapshot,
    pub timestamp: u64,
    pub queue_name: String,
}

impl Snapshot {
    pub fn empty(queue_name: &str) -> Self {
        Self {
            queue: Vec::new(),
            stats: CountersSnapshot::default(),
            timestamp: now_ms(),
            queue_name: queue_name.to_string(),
        }
    }
}

/// Owns the primary/backup file pair for one named queue.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    queue_name: String,
    primary: PathBuf,
    backup: PathBuf,
}

impl SnapshotStore {
    pub fn new(directory: &Path, queue_name: &str) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            primary: directory.join(format!("{queue_name}.json")),
            backup: directory.join(format!("{queue_name}.backup.json")),
        }
    }

    /// Creates the storage directory; the one startup step that can fail
    /// loudly, since nothing can be persisted without it.
    pub async fn ensure_dir(directory: &Path) {
        if let Err(e) = tokio::fs::create_dir_all(directory).await {
            warn!(dir = %directory.display(), error = %e, "could not create storage directory; persistence disabled until it exists");
        }
    }

    /// Restores the last snapshot: primary, then backup, then empty.
    pub async fn load(&self) -> Snapshot {
        match self.read_snapshot(&self.primary).await {
            Ok(snapshot) => {
                debug!(
                    queue = %self.queue_name,
                    items = snapshot.queue.len(),
                    "restored snapshot from primary file"
                );
                return snapshot;
            }
            Err(e) => {
                debug!(queue = %self.queue_name, error = %e, "primary snapshot unreadable, trying backup");
            }
        }

        match self.read_snapshot(&self.backup).await {
            Ok(snapshot) => {
                warn!(
                    queue = %self.queue_name,
                    items = snapshot.queue.len(),
                    "primary snapshot unreadable, recovered from backup"
                );
                snapshot
            }
            Err(e) => {
                warn!(queue = %self.queue_name, error = %e, "no usable snapshot, starting empty");
                Snapshot::empty(&self.queue_name)
            }
        }
    }

    /// Writes a snapshot; returns whether the primary write succeeded.
    ///
    /// The backup copy is best-effort: a failed copy is logged and does
    /// not block the primary write.
    pub async fn persist(&self, snapshot: &Snapshot) -> bool {
        if tokio::fs::try_exists(&self.primary).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::copy(&self.primary, &self.backup).await {
                warn!(queue = %self.queue_name, error = %e, "failed to refresh backup snapshot");
            }
        }

        let serialized = match serde_json::to_vec_pretty(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(queue = %self.queue_name, error = %e, "failed to serialize snapshot");
                return false;
            }
        };

        match tokio::fs::write(&self.primary, serialized).await {
            Ok(()) => {
                debug!(
                    queue = %self.queue_name,
                    items = snapshot.queue.len(),
                    "persisted snapshot"
                );
                true
            }
            Err(e) => {
                warn!(queue = %self.queue_name, error = %e, "failed to write snapshot");
                false
            }
        }
    }

    async fn read_snapshot(&self, path: &Path) -> anyhow::Result<Snapshot> {
        let raw = tokio::fs::read(path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&raw)?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_snapshot(name: &str) -> Snapshot {
        let mut snapshot = Snapshot::empty(name);
        snapshot.queue.push(QueueItem::new(name, json!({"k": 1}), 5, 3));
        snapshot.stats.added = 1;
        snapshot
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "outbound");

        let snapshot = sample_snapshot("outbound");
        assert!(store.persist(&snapshot).await);

        let restored = store.load().await;
        assert_eq!(restored.queue.len(), 1);
        assert_eq!(restored.queue[0].id, snapshot.queue[0].id);
        assert_eq!(restored.stats, snapshot.stats);
        assert_eq!(restored.queue_name, "outbound");
    }

    #[tokio::test]
    async fn load_falls_back_to_backup_when_primary_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "outbound");

        let snapshot = sample_snapshot("outbound");
        assert!(store.persist(&snapshot).await);
        // Second persist copies the valid primary into the backup slot.
        assert!(store.persist(&snapshot).await);

        tokio::fs::write(dir.path().join("outbound.json"), b"{ not json")
            .await
            .unwrap();

        let restored = store.load().await;
        assert_eq!(restored.queue.len(), 1);
        assert_eq!(restored.queue[0].id, snapshot.queue[0].id);
    }

    #[tokio::test]
    async fn load_starts_empty_when_nothing_usable() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "outbound");

        tokio::fs::write(dir.path().join("outbound.json"), b"garbage")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("outbound.backup.json"), b"also garbage")
            .await
            .unwrap();

        let restored = store.load().await;
        assert!(restored.queue.is_empty());
        assert_eq!(restored.stats, CountersSnapshot::default());
    }

    #[tokio::test]
    async fn persist_failure_is_signaled_not_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        let store = SnapshotStore::new(&missing, "outbound");

        let snapshot = sample_snapshot("outbound");
        assert!(!store.persist(&snapshot).await);
    }
}
