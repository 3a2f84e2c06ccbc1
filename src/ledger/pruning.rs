//! Retention policy for the activity log
use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionHandle};
use tracing::{debug, info, warn};

use super::error::Result;
use crate::reporting::ActivityEntry;

/// Pruning statistics
#[derive(Debug, Default)]
pub struct PruneStats {
    pub activity_pruned: usize,
}

/// Remove activity entries older than `ttl_days`
///
/// Keys are in append order and `at` only grows with the sequence, so the
/// scan stops at the first entry inside the retention window.
pub fn prune_expired(
    keyspace: &Keyspace,
    activity_partition: &PartitionHandle,
    ttl_days: u32,
    now: DateTime<Utc>,
) -> Result<PruneStats> {
    let cutoff = now - chrono::Duration::days(i64::from(ttl_days));
    let mut stats = PruneStats::default();
    let mut batch = keyspace.batch();

    for item in activity_partition.iter() {
        let (key, value) = item?;

        match serde_json::from_slice::<ActivityEntry>(&value) {
            Ok(entry) if entry.at >= cutoff => break,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Dropping unreadable activity entry"),
        }

        batch.remove(activity_partition, key);
        stats.activity_pruned += 1;
    }

    batch.commit()?;
    keyspace.persist(fjall::PersistMode::SyncAll)?;

    debug!(%cutoff, "Activity cutoff applied");
    info!("Pruning complete: {:?}", stats);

    Ok(stats)
}
