use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use crate::reporting::{ActivityEntry, ActivityKind};

use super::control::RunControl;
use super::error::Result;
use super::partitions::{CONTROL_ID, decode_activity_key, encode_activity_key, encode_control_key};
use super::pruning::{PruneStats, prune_expired};

/// Fjall-backed persistent storage for the run control record and activity log
#[derive(Clone)]
pub struct LedgerStore {
    keyspace: Keyspace,
    control: PartitionHandle,
    activity: PartitionHandle,
    next_activity: Arc<AtomicU64>,
    write_lock: Arc<Mutex<()>>,
}

impl LedgerStore {
    /// Open or create a ledger at the given path, seeding the control record
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let control = keyspace.open_partition("control", PartitionCreateOptions::default())?;
        let activity = keyspace.open_partition("activity", PartitionCreateOptions::default())?;

        let next_activity = match activity.last_key_value()? {
            Some((key, _)) => decode_activity_key(&key).map_or(0, |seq| seq + 1),
            None => 0,
        };

        let store = Self {
            keyspace,
            control,
            activity,
            next_activity: Arc::new(AtomicU64::new(next_activity)),
            write_lock: Arc::new(Mutex::new(())),
        };

        if store.control.get(encode_control_key(CONTROL_ID))?.is_none() {
            store
                .control
                .insert(encode_control_key(CONTROL_ID), serde_json::to_vec(&RunControl::default())?)?;
            info!("Seeded run control record");
        }

        info!("Ledger opened successfully");
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current run control record
    pub fn control(&self) -> Result<RunControl> {
        match self.control.get(encode_control_key(CONTROL_ID))? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(RunControl::default()),
        }
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.control()?.is_running)
    }

    /// Mark the run as started; fails with `AlreadyRunning` if it is
    pub fn start(&self, actor: &str) -> Result<RunControl> {
        let _guard = self.lock();
        let now = Utc::now();
        let mut control = self.control()?;
        control.start(actor, now)?;

        let entry = ActivityEntry::new(ActivityKind::Started).with_message(format!("started by {actor}"));
        self.commit_control(&control, Some(entry))?;

        info!(actor, total_processed = control.total_processed, "Run started");
        Ok(control)
    }

    /// Mark the run as stopped, whether or not it was running
    pub fn stop(&self) -> Result<RunControl> {
        let _guard = self.lock();
        let mut control = self.control()?;
        let was_running = control.stop(Utc::now());

        let entry = was_running.then(|| ActivityEntry::new(ActivityKind::Stopped));
        self.commit_control(&control, entry)?;

        info!(was_running, "Run stopped");
        Ok(control)
    }

    /// Add a finished batch to the counters
    pub fn record_batch(&self, processed: u64) -> Result<RunControl> {
        let _guard = self.lock();
        let mut control = self.control()?;
        control.record_batch(processed, Utc::now());
        self.commit_control(&control, None)?;

        debug!(
            processed,
            total_processed = control.total_processed,
            current_batch = control.current_batch,
            "Batch recorded"
        );
        Ok(control)
    }

    fn commit_control(&self, control: &RunControl, entry: Option<ActivityEntry>) -> Result<()> {
        let mut batch = self.keyspace.batch();
        batch.insert(&self.control, encode_control_key(CONTROL_ID), serde_json::to_vec(control)?);

        if let Some(mut entry) = entry {
            entry.id = self.next_activity.fetch_add(1, Ordering::SeqCst);
            batch.insert(&self.activity, encode_activity_key(entry.id), serde_json::to_vec(&entry)?);
        }

        batch.commit()?;
        Ok(())
    }

    /// Append an activity entry, assigning its sequence id
    pub fn append_activity(&self, mut entry: ActivityEntry) -> Result<ActivityEntry> {
        entry.id = self.next_activity.fetch_add(1, Ordering::SeqCst);
        self.activity
            .insert(encode_activity_key(entry.id), serde_json::to_vec(&entry)?)?;
        debug!(id = entry.id, kind = ?entry.kind, "Activity appended");
        Ok(entry)
    }

    /// Most recent activity first
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        self.activity
            .iter()
            .rev()
            .take(limit)
            .map(|item| -> Result<ActivityEntry> {
                let (_, value) = item?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    /// Drop activity entries older than the retention window
    pub fn prune_expired(&self, ttl_days: u32) -> Result<PruneStats> {
        info!(ttl_days, "Starting pruning process");
        prune_expired(&self.keyspace, &self.activity, ttl_days, Utc::now())
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn health_check(&self) -> Result<()> {
        self.control.get(encode_control_key(CONTROL_ID))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use tempfile::TempDir;

    fn create_test_store() -> (LedgerStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::open(temp_dir.path().join("test_ledger")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_control_is_seeded() {
        let (store, _temp) = create_test_store();
        let control = store.control().unwrap();
        assert_eq!(control, RunControl::default());
        assert!(!store.is_running().unwrap());
    }

    #[test]
    fn test_start_stop_cycle_logs_activity() {
        let (store, _temp) = create_test_store();

        let started = store.start("dashboard").unwrap();
        assert!(started.is_running);
        assert_eq!(started.started_by.as_deref(), Some("dashboard"));

        assert!(matches!(
            store.start("cli"),
            Err(LedgerError::AlreadyRunning { .. })
        ));

        let stopped = store.stop().unwrap();
        assert!(!stopped.is_running);
        assert!(stopped.stopped_at.is_some());

        // Second stop is a no-op for the log
        store.stop().unwrap();

        let kinds: Vec<ActivityKind> = store
            .recent_activity(10)
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![ActivityKind::Stopped, ActivityKind::Started]);
    }

    #[test]
    fn test_counters_never_decrease() {
        let (store, _temp) = create_test_store();
        let mut last_total = 0;

        for round in 0..3u64 {
            store.start("cli").unwrap();
            for processed in [0, 4, 2] {
                let control = store.record_batch(processed).unwrap();
                assert!(control.total_processed >= last_total);
                last_total = control.total_processed;
            }
            let stopped = store.stop().unwrap();
            assert_eq!(stopped.total_processed, 6 * (round + 1));
        }

        let control = store.control().unwrap();
        assert_eq!(control.total_processed, 18);
        assert_eq!(control.current_batch, 9);
        assert!(control.last_run_at.is_some());
    }

    #[test]
    fn test_activity_ids_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger");

        {
            let store = LedgerStore::open(&path).unwrap();
            store.append_activity(ActivityEntry::batch(1, 0)).unwrap();
            store.append_activity(ActivityEntry::batch(2, 1)).unwrap();
            store.persist().unwrap();
        }

        let store = LedgerStore::open(&path).unwrap();
        let entry = store.append_activity(ActivityEntry::batch(3, 0)).unwrap();
        assert_eq!(entry.id, 2);

        let recent = store.recent_activity(2).unwrap();
        assert_eq!(recent.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_prune_removes_only_expired_entries() {
        let (store, _temp) = create_test_store();

        let mut old = ActivityEntry::batch(1, 0);
        old.at = Utc::now() - chrono::Duration::days(45);
        store.append_activity(old).unwrap();
        store.append_activity(ActivityEntry::batch(2, 0)).unwrap();

        let stats = store.prune_expired(30).unwrap();
        assert_eq!(stats.activity_pruned, 1);

        let remaining = store.recent_activity(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].processed, 2);
    }
}
