use std::sync::Arc;

use crate::config::Config;
use crate::driver::LocalBackend;
use crate::ledger::LedgerStore;
use crate::observability::Metrics;
use crate::queue::QueueStore;
use crate::records::{FjallRecords, RecordStore};
use crate::storage::StorageClient;
use crate::worker::BatchWorker;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: Arc<QueueStore>,
    pub ledger: LedgerStore,
    pub records: Arc<FjallRecords>,
    pub storage: StorageClient,
    pub worker: BatchWorker,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Open every store under `server.data_dir` and wire the worker
    pub fn open(config: Config) -> Result<Self, AnyError> {
        let config = Arc::new(config);
        std::fs::create_dir_all(&config.server.data_dir)?;

        let queue = Arc::new(
            QueueStore::open(config.server.queue_path())
                .map_err(|e| format!("Failed to open queue: {}", e))?,
        );
        let ledger = LedgerStore::open(config.server.ledger_path())
            .map_err(|e| format!("Failed to open ledger: {}", e))?;
        let records = Arc::new(
            FjallRecords::open(config.server.records_path())
                .map_err(|e| format!("Failed to open records: {}", e))?,
        );
        let storage = StorageClient::new(config.storage.clone());
        let metrics = Arc::new(Metrics::new());

        let worker = BatchWorker::new(
            Arc::clone(&config),
            Arc::clone(&queue),
            ledger.clone(),
            Arc::clone(&records) as Arc<dyn RecordStore>,
            storage.clone(),
            Arc::clone(&metrics),
        )?;

        Ok(Self {
            config,
            queue,
            ledger,
            records,
            storage,
            worker,
            metrics,
        })
    }

    /// Driver backend sharing this state's stores and worker
    pub fn local_backend(&self) -> LocalBackend {
        LocalBackend::new(
            Arc::clone(&self.queue),
            self.ledger.clone(),
            self.worker.clone(),
            Arc::clone(&self.metrics),
        )
    }
}
