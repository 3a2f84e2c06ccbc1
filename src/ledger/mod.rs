/// Fjall-based persistence for run control and the activity log
///
/// Two partitions live in one keyspace:
///
/// - `control`: the singleton [`RunControl`] record, seeded on first open and
///   never deleted
/// - `activity`: append-only [`ActivityEntry`](crate::reporting::ActivityEntry)
///   records (batches, starts, stops, resets, recoveries)
///
/// Control mutations are serialized by a process-local lock and written as a
/// single batch together with their activity entry.
///
/// ## Retention
///
/// Activity older than `retention.activity_ttl_days` is removed by
/// `LedgerStore::prune_expired()`, which the server runs at startup.
///
/// ## Usage
///
/// ```rust,ignore
/// use docmirror::ledger::LedgerStore;
///
/// let ledger = LedgerStore::open("data/ledger")?;
/// ledger.start("cli")?;
/// ledger.record_batch(12)?;
/// assert!(ledger.is_running()?);
/// ```

pub mod control;
pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use control::RunControl;
pub use error::{LedgerError, Result};
pub use pruning::PruneStats;
pub use store::LedgerStore;
