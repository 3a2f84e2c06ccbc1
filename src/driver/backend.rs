use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::ledger::{LedgerError, LedgerStore, RunControl};
use crate::observability::Metrics;
use crate::queue::{QueueError, QueueStore};
use crate::reporting::QueueStats;
use crate::worker::{BatchOutcome, BatchWorker, WorkerError};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Run already in progress")]
    AlreadyRunning,

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Missing or invalid token")]
    Unauthorized,

    #[error("Token lacks the admin role")]
    Forbidden,

    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },
}

impl From<LedgerError> for BackendError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyRunning { .. } => BackendError::AlreadyRunning,
            other => BackendError::Ledger(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Everything the driver loop needs from the outside world
///
/// Run control calls map onto the persisted control record; `invoke_batch`
/// runs exactly one worker invocation.
#[async_trait]
pub trait DriverBackend: Send + Sync {
    /// Fails with `AlreadyRunning` when the control record says so
    async fn start(&self, actor: &str) -> Result<RunControl>;

    async fn stop(&self) -> Result<RunControl>;

    async fn is_running(&self) -> Result<bool>;

    async fn pending_count(&self) -> Result<u64>;

    async fn invoke_batch(&self) -> Result<BatchOutcome>;

    async fn record_batch(&self, processed: u64) -> Result<RunControl>;

    async fn stats(&self) -> Result<QueueStats>;
}

/// Backend running the worker in-process against local stores
#[derive(Clone)]
pub struct LocalBackend {
    queue: Arc<QueueStore>,
    ledger: LedgerStore,
    worker: BatchWorker,
    metrics: Arc<Metrics>,
}

impl LocalBackend {
    pub fn new(
        queue: Arc<QueueStore>,
        ledger: LedgerStore,
        worker: BatchWorker,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            ledger,
            worker,
            metrics,
        }
    }
}

#[async_trait]
impl DriverBackend for LocalBackend {
    async fn start(&self, actor: &str) -> Result<RunControl> {
        Ok(self.ledger.start(actor)?)
    }

    async fn stop(&self) -> Result<RunControl> {
        Ok(self.ledger.stop()?)
    }

    async fn is_running(&self) -> Result<bool> {
        Ok(self.ledger.is_running()?)
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self.queue.pending_count()?)
    }

    async fn invoke_batch(&self) -> Result<BatchOutcome> {
        self.worker.run_batch().await.map_err(|e| {
            self.metrics.invocation_failed();
            e.into()
        })
    }

    async fn record_batch(&self, processed: u64) -> Result<RunControl> {
        Ok(self.ledger.record_batch(processed)?)
    }

    async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            counts: self.queue.counts()?,
            control: self.ledger.control()?,
            metrics: Some(self.metrics.snapshot()),
        })
    }
}
