use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::{ItemOutcome, NewQueueItem, QueueCounts, QueueItem, QueueStatus};
use crate::worker::paths::sanitize_file_name;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate item for {table}/{record_id}/{file_name} (existing id={existing})")]
    DuplicateKind {
        table: String,
        record_id: String,
        file_name: String,
        existing: u64,
    },

    #[error("Queue item not found: id={0}")]
    ItemNotFound(u64),

    #[error("Cannot {action} item {id} in status {from}")]
    InvalidTransition {
        id: u64,
        from: QueueStatus,
        action: &'static str,
    },

    #[error("Invalid item: {0}")]
    InvalidItem(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;

const NEXT_ID_KEY: &[u8] = b"next_id";
const PENDING_MARKER: &[u8] = &[];

/// Fjall-backed download queue
///
/// Partitions:
/// - `items`: u64 id (big-endian) -> QueueItem (JSON)
/// - `pending`: u64 id (big-endian) -> empty; FIFO index of claimable items
/// - `dedup`: table/record/file name -> u64 id
/// - `metadata`: "next_id" -> u64
///
/// Every mutation runs under `write_lock` and lands as one atomic write
/// batch, so a claim selects and transitions its items in a single step and
/// two concurrent claimers never receive the same id.
///
/// Claims handed out by this store stay in `in_flight` until they are
/// finalized or released. Stale recovery never touches them, so only claims
/// orphaned by a dead process go back to `pending`.
pub struct QueueStore {
    keyspace: Keyspace,
    items: PartitionHandle,
    pending: PartitionHandle,
    dedup: PartitionHandle,
    metadata: PartitionHandle,
    next_id: AtomicU64,
    write_lock: Mutex<()>,
    in_flight: Mutex<HashSet<u64>>,
}

impl QueueStore {
    /// Open or create a queue at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening QueueStore at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;

        let items = keyspace.open_partition("items", PartitionCreateOptions::default())?;
        let pending = keyspace.open_partition("pending", PartitionCreateOptions::default())?;
        let dedup = keyspace.open_partition("dedup", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let next_id = metadata
            .get(NEXT_ID_KEY)?
            .and_then(|bytes| decode_id(&bytes))
            .unwrap_or(0);

        info!(next_id, "QueueStore opened");

        Ok(Self {
            keyspace,
            items,
            pending,
            dedup,
            metadata,
            next_id: AtomicU64::new(next_id),
            write_lock: Mutex::new(()),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guard protects no in-memory data, so a poisoned lock is still usable
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop claims held by this process without touching their rows
    ///
    /// The rows stay `processing` and become eligible for stale recovery.
    pub fn release(&self, ids: &[u64]) {
        let mut in_flight = self.in_flight();
        for id in ids {
            in_flight.remove(id);
        }
    }

    /// Whether this process currently holds a claim on `id`
    pub fn is_in_flight(&self, id: u64) -> bool {
        self.in_flight().contains(&id)
    }

    /// Persist a new pending item
    ///
    /// Fails with `DuplicateKind` when an item for the same table, record and
    /// sanitized file name already exists, whatever its status.
    pub fn enqueue(&self, new_item: NewQueueItem) -> Result<QueueItem> {
        let file_name = validate_new_item(&new_item)?;
        let dedup = dedup_key(&new_item.table_name, &new_item.record_id, &file_name);

        let _guard = self.lock();

        if let Some(existing) = self.dedup.get(&dedup)? {
            return Err(QueueError::DuplicateKind {
                table: new_item.table_name,
                record_id: new_item.record_id,
                file_name,
                existing: decode_id(&existing).unwrap_or_default(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let item = QueueItem {
            id,
            storage_path: new_item.storage_path.clone().unwrap_or_default(),
            bucket: new_item.bucket_or_default(),
            column_name: new_item.column_or_default(),
            max_attempts: new_item.max_attempts_or_default(),
            file_url: new_item.file_url,
            table_name: new_item.table_name,
            record_id: new_item.record_id,
            status: QueueStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        };

        let mut batch = self.keyspace.batch();
        batch.insert(&self.items, id_key(id), serde_json::to_vec(&item)?);
        batch.insert(&self.pending, id_key(id), PENDING_MARKER);
        batch.insert(&self.dedup, dedup, id_key(id));
        batch.insert(&self.metadata, NEXT_ID_KEY, id_key(id + 1));
        batch.commit()?;

        debug!(
            id,
            table = %item.table_name,
            record_id = %item.record_id,
            "Item enqueued"
        );

        Ok(item)
    }

    /// Retrieve an item by id
    pub fn get(&self, id: u64) -> Result<Option<QueueItem>> {
        match self.items.get(id_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn require(&self, id: u64) -> Result<QueueItem> {
        self.get(id)?.ok_or(QueueError::ItemNotFound(id))
    }

    /// Atomically move up to `limit` pending items (oldest first) to `processing`
    pub fn claim_pending(&self, limit: usize) -> Result<Vec<QueueItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let _guard = self.lock();
        let now = Utc::now();
        let mut claimed = Vec::new();
        let mut batch = self.keyspace.batch();

        for entry in self.pending.iter().take(limit) {
            let (key, _) = entry?;
            batch.remove(&self.pending, key.clone());

            let Some(id) = decode_id(&key) else {
                warn!("Dropping malformed pending index key");
                continue;
            };

            match self.get(id)? {
                Some(mut item) if item.status == QueueStatus::Pending => {
                    item.status = QueueStatus::Processing;
                    item.started_at = Some(now);
                    batch.insert(&self.items, id_key(id), serde_json::to_vec(&item)?);
                    claimed.push(item);
                }
                Some(item) => {
                    warn!(id, status = %item.status, "Pending index pointed at non-pending item");
                }
                None => warn!(id, "Pending index pointed at missing item"),
            }
        }

        batch.commit()?;
        self.in_flight().extend(claimed.iter().map(|item| item.id));

        if !claimed.is_empty() {
            debug!(count = claimed.len(), "Claimed pending items");
        }

        Ok(claimed)
    }

    /// Close out a claimed item
    ///
    /// Success marks it `completed`. Failure consumes one attempt and returns
    /// it to `pending`, or to `failed` once `attempts` reaches `max_attempts`.
    pub fn finalize(&self, id: u64, outcome: ItemOutcome) -> Result<QueueItem> {
        let _guard = self.lock();
        let mut item = self.require(id)?;

        if item.status != QueueStatus::Processing {
            return Err(QueueError::InvalidTransition {
                id,
                from: item.status,
                action: "finalize",
            });
        }

        let now = Utc::now();
        let mut batch = self.keyspace.batch();

        match outcome {
            ItemOutcome::Completed { storage_path } => {
                item.status = QueueStatus::Completed;
                item.storage_path = storage_path;
                item.completed_at = Some(now);
                item.error_message = None;
            }
            ItemOutcome::Failed { error } => {
                item.attempts = (item.attempts + 1).min(item.max_attempts);
                item.error_message = Some(error);

                if item.attempts_exhausted() {
                    item.status = QueueStatus::Failed;
                    item.completed_at = Some(now);
                } else {
                    item.status = QueueStatus::Pending;
                    batch.insert(&self.pending, id_key(id), PENDING_MARKER);
                }
            }
        }

        batch.insert(&self.items, id_key(id), serde_json::to_vec(&item)?);
        batch.commit()?;
        self.in_flight().remove(&id);

        debug!(id, status = %item.status, attempts = item.attempts, "Item finalized");

        Ok(item)
    }

    /// Operator reset: back to `pending` with a fresh attempt budget
    pub fn reset(&self, id: u64) -> Result<QueueItem> {
        let _guard = self.lock();
        let item = self.require(id)?;

        if item.status == QueueStatus::Processing {
            return Err(QueueError::InvalidTransition {
                id,
                from: item.status,
                action: "reset",
            });
        }

        let mut batch = self.keyspace.batch();
        let item = self.stage_reset(&mut batch, item)?;
        batch.commit()?;

        info!(id, "Item reset to pending");
        Ok(item)
    }

    /// Reset every `failed` item; returns the ids that were reset
    pub fn reset_failed(&self) -> Result<Vec<u64>> {
        let _guard = self.lock();
        let mut batch = self.keyspace.batch();
        let mut ids = Vec::new();

        for item in self.scan()? {
            if item.status == QueueStatus::Failed {
                ids.push(item.id);
                self.stage_reset(&mut batch, item)?;
            }
        }

        batch.commit()?;
        info!(count = ids.len(), "Failed items reset to pending");
        Ok(ids)
    }

    fn stage_reset(&self, batch: &mut fjall::Batch, mut item: QueueItem) -> Result<QueueItem> {
        item.status = QueueStatus::Pending;
        item.attempts = 0;
        item.error_message = None;
        item.started_at = None;
        item.completed_at = None;

        batch.insert(&self.items, id_key(item.id), serde_json::to_vec(&item)?);
        batch.insert(&self.pending, id_key(item.id), PENDING_MARKER);
        Ok(item)
    }

    /// Return claims abandoned by a crashed worker to `pending`
    ///
    /// Claims this process still holds are skipped however old they are.
    /// Does not consume an attempt: the item never reached a verdict.
    pub fn recover_stale(&self, older_than: Duration) -> Result<Vec<u64>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());

        let _guard = self.lock();
        let in_flight = self.in_flight().clone();
        let mut batch = self.keyspace.batch();
        let mut recovered = Vec::new();

        for mut item in self.scan()? {
            let stale = item.status == QueueStatus::Processing
                && !in_flight.contains(&item.id)
                && item.started_at.is_none_or(|started| started < cutoff);
            if !stale {
                continue;
            }

            item.status = QueueStatus::Pending;
            batch.insert(&self.items, id_key(item.id), serde_json::to_vec(&item)?);
            batch.insert(&self.pending, id_key(item.id), PENDING_MARKER);
            recovered.push(item.id);
        }

        batch.commit()?;

        if !recovered.is_empty() {
            warn!(count = recovered.len(), "Recovered stale processing items");
        }

        Ok(recovered)
    }

    /// Number of claimable items
    pub fn pending_count(&self) -> Result<u64> {
        Ok(self.pending.len()? as u64)
    }

    pub fn counts(&self) -> Result<QueueCounts> {
        let mut counts = QueueCounts::default();
        for item in self.scan()? {
            counts.bump(item.status);
        }
        Ok(counts)
    }

    /// Items in insertion order, optionally filtered by status
    pub fn list(&self, status: Option<QueueStatus>, limit: usize) -> Result<Vec<QueueItem>> {
        let mut results = Vec::new();

        for entry in self.items.iter() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            let item: QueueItem = serde_json::from_slice(&value)?;
            if status.is_none_or(|s| s == item.status) {
                results.push(item);
            }
        }

        Ok(results)
    }

    fn scan(&self) -> Result<Vec<QueueItem>> {
        self.items
            .iter()
            .map(|entry| -> Result<QueueItem> {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Health check - verify database is accessible
    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(NEXT_ID_KEY)?;
        Ok(())
    }
}

fn validate_new_item(item: &NewQueueItem) -> Result<String> {
    let url = reqwest::Url::parse(&item.file_url)
        .map_err(|e| QueueError::InvalidItem(format!("file_url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(QueueError::InvalidItem(format!(
            "file_url must be http(s), got {}",
            url.scheme()
        )));
    }

    for (field, value) in [
        ("table_name", item.table_name.as_str()),
        ("record_id", item.record_id.as_str()),
    ] {
        if value.trim().is_empty() {
            return Err(QueueError::InvalidItem(format!("{field} must not be empty")));
        }
    }

    if item.bucket.as_deref().is_none_or(|b| b.trim().is_empty()) {
        return Err(QueueError::InvalidItem("bucket must not be empty".to_string()));
    }
    if item.column_name.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(QueueError::InvalidItem("column_name must not be empty".to_string()));
    }
    if item.max_attempts == Some(0) {
        return Err(QueueError::InvalidItem("max_attempts must be at least 1".to_string()));
    }

    let requested = item.storage_path.as_deref().filter(|p| !p.is_empty());
    crate::worker::paths::derive_file_name(requested, &item.file_url)
        .ok_or_else(|| QueueError::InvalidItem("cannot derive a file name".to_string()))
}

fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn decode_id(bytes: &[u8]) -> Option<u64> {
    bytes.try_into().ok().map(u64::from_be_bytes)
}

fn dedup_key(table: &str, record_id: &str, file_name: &str) -> Vec<u8> {
    format!("{table}\u{1f}{record_id}\u{1f}{}", sanitize_file_name(file_name)).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn new_item(record_id: &str, file: &str) -> NewQueueItem {
        NewQueueItem::builder()
            .file_url(format!("https://parliament.example/files/{file}"))
            .table_name("parliament_documents")
            .record_id(record_id)
            .bucket("documents")
            .build()
    }

    fn open_store() -> (QueueStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = QueueStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_enqueue_and_retrieve() {
        let (store, _temp) = open_store();

        let item = store.enqueue(new_item("rec-1", "bill.pdf")).unwrap();
        assert_eq!(item.id, 0);
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.max_attempts, 3);
        assert_eq!(item.column_name, "local_files");

        let retrieved = store.get(item.id).unwrap().unwrap();
        assert_eq!(retrieved, item);
        assert_eq!(store.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let (store, _temp) = open_store();
        store.enqueue(new_item("rec-1", "bill.pdf")).unwrap();

        let err = store.enqueue(new_item("rec-1", "bill.pdf")).unwrap_err();
        assert!(matches!(err, QueueError::DuplicateKind { existing: 0, .. }));

        // Same file on another record is a different item
        assert!(store.enqueue(new_item("rec-2", "bill.pdf")).is_ok());
    }

    #[test]
    fn test_duplicate_detection_uses_sanitized_name() {
        let (store, _temp) = open_store();
        let mut first = new_item("rec-1", "x.pdf");
        first.storage_path = Some("Annex 1.pdf".to_string());
        let mut second = new_item("rec-1", "y.pdf");
        second.storage_path = Some("Annex_1.pdf".to_string());

        store.enqueue(first).unwrap();
        assert!(matches!(
            store.enqueue(second),
            Err(QueueError::DuplicateKind { .. })
        ));
    }

    #[test]
    fn test_invalid_items_rejected() {
        let (store, _temp) = open_store();

        let mut bad_url = new_item("rec-1", "a.pdf");
        bad_url.file_url = "ftp://host/a.pdf".to_string();
        assert!(matches!(store.enqueue(bad_url), Err(QueueError::InvalidItem(_))));

        let mut no_bucket = new_item("rec-1", "a.pdf");
        no_bucket.bucket = None;
        assert!(matches!(store.enqueue(no_bucket), Err(QueueError::InvalidItem(_))));

        let mut no_name = new_item("rec-1", "a.pdf");
        no_name.file_url = "https://parliament.example/".to_string();
        assert!(matches!(store.enqueue(no_name), Err(QueueError::InvalidItem(_))));
    }

    #[test]
    fn test_claim_is_fifo_and_bounded() {
        let (store, _temp) = open_store();
        for i in 0..5 {
            store.enqueue(new_item(&format!("rec-{i}"), "a.pdf")).unwrap();
        }

        let claimed = store.claim_pending(3).unwrap();
        let ids: Vec<u64> = claimed.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(claimed.iter().all(|i| i.status == QueueStatus::Processing));
        assert!(claimed.iter().all(|i| i.started_at.is_some()));

        assert_eq!(store.pending_count().unwrap(), 2);
        assert_eq!(store.get(0).unwrap().unwrap().status, QueueStatus::Processing);
    }

    #[test]
    fn test_completed_items_are_not_reclaimed() {
        let (store, _temp) = open_store();
        let item = store.enqueue(new_item("rec-1", "a.pdf")).unwrap();

        store.claim_pending(10).unwrap();
        store
            .finalize(
                item.id,
                ItemOutcome::Completed {
                    storage_path: "parliament/2024/rec-1/a.pdf".to_string(),
                },
            )
            .unwrap();

        assert!(store.claim_pending(10).unwrap().is_empty());
        let done = store.get(item.id).unwrap().unwrap();
        assert_eq!(done.status, QueueStatus::Completed);
        assert_eq!(done.storage_path, "parliament/2024/rec-1/a.pdf");
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_retry_until_failed() {
        let (store, _temp) = open_store();
        let item = store.enqueue(new_item("rec-1", "a.pdf")).unwrap();

        for expected_attempts in 1..=3 {
            let claimed = store.claim_pending(10).unwrap();
            assert_eq!(claimed.len(), 1);

            let after = store
                .finalize(
                    item.id,
                    ItemOutcome::Failed {
                        error: "HTTP 404".to_string(),
                    },
                )
                .unwrap();

            assert_eq!(after.attempts, expected_attempts);
            if expected_attempts < 3 {
                assert_eq!(after.status, QueueStatus::Pending);
            } else {
                assert_eq!(after.status, QueueStatus::Failed);
            }
        }

        // Terminal: nothing left to claim
        assert!(store.claim_pending(10).unwrap().is_empty());
        let failed = store.get(item.id).unwrap().unwrap();
        assert_eq!(failed.attempts, failed.max_attempts);
        assert_eq!(failed.error_message.as_deref(), Some("HTTP 404"));
    }

    #[test]
    fn test_finalize_requires_processing() {
        let (store, _temp) = open_store();
        let item = store.enqueue(new_item("rec-1", "a.pdf")).unwrap();

        let err = store
            .finalize(item.id, ItemOutcome::Failed { error: "x".into() })
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: QueueStatus::Pending,
                ..
            }
        ));
        assert!(matches!(
            store.finalize(99, ItemOutcome::Failed { error: "x".into() }),
            Err(QueueError::ItemNotFound(99))
        ));
    }

    #[test]
    fn test_reset_failed_item() {
        let (store, _temp) = open_store();
        let mut new = new_item("rec-1", "a.pdf");
        new.max_attempts = Some(1);
        let item = store.enqueue(new).unwrap();

        store.claim_pending(1).unwrap();
        store
            .finalize(item.id, ItemOutcome::Failed { error: "timeout".into() })
            .unwrap();

        let reset = store.reset(item.id).unwrap();
        assert_eq!(reset.status, QueueStatus::Pending);
        assert_eq!(reset.attempts, 0);
        assert!(reset.error_message.is_none());
        assert_eq!(store.claim_pending(1).unwrap().len(), 1);

        // In-flight items cannot be reset
        assert!(matches!(
            store.reset(item.id),
            Err(QueueError::InvalidTransition { action: "reset", .. })
        ));
    }

    #[test]
    fn test_reset_all_failed() {
        let (store, _temp) = open_store();
        for i in 0..3 {
            let mut new = new_item(&format!("rec-{i}"), "a.pdf");
            new.max_attempts = Some(1);
            store.enqueue(new).unwrap();
        }

        for item in store.claim_pending(2).unwrap() {
            store
                .finalize(item.id, ItemOutcome::Failed { error: "boom".into() })
                .unwrap();
        }

        let ids = store.reset_failed().unwrap();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(store.counts().unwrap().pending, 3);
    }

    #[test]
    fn test_recover_stale_claims() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = QueueStore::open(temp_dir.path()).unwrap();
            store.enqueue(new_item("rec-1", "a.pdf")).unwrap();
            store.claim_pending(1).unwrap();
            store.flush().unwrap();
        }

        // A fresh process holds none of the old claims
        let store = QueueStore::open(temp_dir.path()).unwrap();
        assert!(store.recover_stale(Duration::from_secs(600)).unwrap().is_empty());

        let recovered = store.recover_stale(Duration::ZERO).unwrap();
        assert_eq!(recovered, vec![0]);

        let item = store.get(0).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(store.claim_pending(1).unwrap().len(), 1);
    }

    #[test]
    fn test_in_flight_claims_are_never_recovered() {
        let (store, _temp) = open_store();
        store.enqueue(new_item("rec-1", "a.pdf")).unwrap();
        store.enqueue(new_item("rec-2", "a.pdf")).unwrap();
        let claimed = store.claim_pending(2).unwrap();
        assert!(store.is_in_flight(claimed[0].id));

        // However old the claim looks, a live holder keeps it
        assert!(store.recover_stale(Duration::ZERO).unwrap().is_empty());
        assert!(store.claim_pending(2).unwrap().is_empty());

        store
            .finalize(claimed[0].id, ItemOutcome::Completed { storage_path: "p".into() })
            .unwrap();
        assert!(!store.is_in_flight(claimed[0].id));

        // A released claim is orphaned and goes back to pending
        store.release(&[claimed[1].id]);
        assert_eq!(store.recover_stale(Duration::ZERO).unwrap(), vec![claimed[1].id]);
        assert_eq!(store.get(claimed[0].id).unwrap().unwrap().status, QueueStatus::Completed);
    }

    #[test]
    fn test_counts_and_list() {
        let (store, _temp) = open_store();
        for i in 0..4 {
            store.enqueue(new_item(&format!("rec-{i}"), "a.pdf")).unwrap();
        }
        let claimed = store.claim_pending(2).unwrap();
        store
            .finalize(
                claimed[0].id,
                ItemOutcome::Completed {
                    storage_path: "p".into(),
                },
            )
            .unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.total(), 4);

        let pending = store.list(Some(QueueStatus::Pending), 10).unwrap();
        assert_eq!(pending.iter().map(|i| i.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(store.list(None, 3).unwrap().len(), 3);
    }

    #[test]
    fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = QueueStore::open(temp_dir.path()).unwrap();
            store.enqueue(new_item("rec-1", "a.pdf")).unwrap();
            store.claim_pending(1).unwrap();
            store.flush().unwrap();
        }

        let store = QueueStore::open(temp_dir.path()).unwrap();
        let next = store.enqueue(new_item("rec-2", "a.pdf")).unwrap();
        assert_eq!(next.id, 1);
        assert_eq!(store.get(0).unwrap().unwrap().status, QueueStatus::Processing);
    }

    #[test]
    fn test_concurrent_claims_never_overlap() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(QueueStore::open(temp_dir.path()).unwrap());
        for i in 0..200 {
            store.enqueue(new_item(&format!("rec-{i}"), "a.pdf")).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    loop {
                        let batch = store.claim_pending(7).unwrap();
                        if batch.is_empty() {
                            break;
                        }
                        mine.extend(batch.into_iter().map(|i| i.id));
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.join().unwrap() {
                total += 1;
                assert!(seen.insert(id), "item {id} claimed twice");
            }
        }
        assert_eq!(total, 200);
        assert_eq!(store.pending_count().unwrap(), 0);
    }
}
