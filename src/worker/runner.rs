//! Batch runner - claims pending items and mirrors each one

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::WorkerError;
use super::http::{DownloadError, HttpClient, HttpConfig, detect_mime};
use super::paths::{build_storage_path, sanitize_file_name};
use crate::config::Config;
use crate::ledger::LedgerStore;
use crate::observability::Metrics;
use crate::queue::{ItemOutcome, QueueItem, QueueStore};
use crate::records::{FileMetadata, RecordError, RecordStore, merge_file_metadata};
use crate::reporting::{ActivityEntry, ActivityKind};
use crate::storage::{StorageClient, StorageError};

/// Why a single item failed; recorded as its `error_message`
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("Record update failed: {0}")]
    Record(#[from] RecordError),

    #[error("{stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: &'static str, after: Duration },

    #[error("Cannot derive a file name from the item")]
    MissingFileName,
}

/// Result of one worker invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub processed: u64,
    pub failed: u64,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.processed == 0 && self.failed == 0
    }
}

/// Stateless batch worker
///
/// Every invocation starts from the persisted queue; nothing is carried over
/// in memory between batches.
#[derive(Clone)]
pub struct BatchWorker {
    config: Arc<Config>,
    queue: Arc<QueueStore>,
    ledger: LedgerStore,
    records: Arc<dyn RecordStore>,
    storage: StorageClient,
    http: HttpClient,
    metrics: Arc<Metrics>,
}

impl BatchWorker {
    pub fn new(
        config: Arc<Config>,
        queue: Arc<QueueStore>,
        ledger: LedgerStore,
        records: Arc<dyn RecordStore>,
        storage: StorageClient,
        metrics: Arc<Metrics>,
    ) -> Result<Self, WorkerError> {
        let http = HttpClient::new(HttpConfig::from(&config.worker))?;

        Ok(Self {
            config,
            queue,
            ledger,
            records,
            storage,
            http,
            metrics,
        })
    }

    /// Claim up to `worker.batch_size` items and process them one by one
    ///
    /// Item failures are recorded on the item and never abort the batch;
    /// only queue access errors surface as `WorkerError`.
    pub async fn run_batch(&self) -> Result<BatchOutcome, WorkerError> {
        let recovered = self.queue.recover_stale(self.config.worker.stale_after())?;
        if !recovered.is_empty() {
            self.metrics.items_recovered(recovered.len() as u64);
            let entry = ActivityEntry::new(ActivityKind::Recovered)
                .with_message(format!("returned {} stale claims to pending", recovered.len()));
            if let Err(e) = self.ledger.append_activity(entry) {
                warn!(error = %e, "Failed to log recovery activity");
            }
        }

        let items = self.queue.claim_pending(self.config.worker.batch_size)?;
        if items.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let _lease = ClaimLease {
            queue: &self.queue,
            ids: items.iter().map(|item| item.id).collect(),
        };

        info!(claimed = items.len(), "Processing batch");
        let mut outcome = BatchOutcome::default();

        for item in items {
            let result = self.process_item(&item).await;

            let (finalize, succeeded) = match result {
                Ok(storage_path) => (
                    self.queue
                        .finalize(item.id, ItemOutcome::Completed { storage_path }),
                    true,
                ),
                Err(e) => {
                    warn!(
                        item_id = item.id,
                        table = %item.table_name,
                        record_id = %item.record_id,
                        attempt = item.attempts + 1,
                        error = %e,
                        "Item failed"
                    );
                    (
                        self.queue.finalize(
                            item.id,
                            ItemOutcome::Failed {
                                error: e.to_string(),
                            },
                        ),
                        false,
                    )
                }
            };

            match finalize {
                Ok(_) if succeeded => {
                    outcome.processed += 1;
                    self.metrics.item_completed();
                }
                Ok(_) => {
                    outcome.failed += 1;
                    self.metrics.item_failed();
                }
                // Stays `processing` until the lease drops and the claim goes stale
                Err(e) => {
                    error!(item_id = item.id, error = %e, "Failed to finalize item");
                    outcome.failed += 1;
                    self.metrics.item_failed();
                }
            }
        }

        self.metrics.batch_run();
        if let Err(e) = self
            .ledger
            .append_activity(ActivityEntry::batch(outcome.processed, outcome.failed))
        {
            warn!(error = %e, "Failed to log batch activity");
        }

        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            "Batch finished"
        );

        Ok(outcome)
    }

    /// Probe, fetch, upload, merge into the record; returns the storage path
    async fn process_item(&self, item: &QueueItem) -> Result<String, ItemError> {
        let file_name = item.file_name().ok_or(ItemError::MissingFileName)?;
        let worker = &self.config.worker;

        self.http.probe(&item.file_url).await?;
        let fetched = self.http.fetch(&item.file_url).await?;

        let storage_path = build_storage_path(
            &self.config.category_for(&item.table_name),
            Utc::now().year(),
            &item.record_id,
            &file_name,
        );

        let uploaded = with_timeout(
            "upload",
            worker.upload_timeout(),
            self.storage
                .upload(&item.bucket, &storage_path, fetched.bytes),
        )
        .await??;
        let size_bytes = uploaded.size as u64;

        let metadata = FileMetadata {
            name: sanitize_file_name(&file_name),
            url: self.storage.public_url(&item.bucket, &storage_path),
            original_url: item.file_url.clone(),
            size_bytes,
            mime_type: detect_mime(fetched.content_type.as_deref(), &file_name),
            uploaded_at: Utc::now(),
        };

        let current = with_timeout(
            "record read",
            worker.record_timeout(),
            self.records
                .read_column(&item.table_name, &item.record_id, &item.column_name),
        )
        .await??;

        let merged = merge_file_metadata(current, &metadata)?;

        with_timeout(
            "record write",
            worker.record_timeout(),
            self.records
                .write_column(&item.table_name, &item.record_id, &item.column_name, merged),
        )
        .await??;

        info!(
            item_id = item.id,
            table = %item.table_name,
            record_id = %item.record_id,
            storage_path = %storage_path,
            size_bytes,
            etag = uploaded.etag.as_deref().unwrap_or("-"),
            "Item mirrored"
        );

        Ok(storage_path)
    }
}

/// Claims of one batch; released when the batch ends or is cancelled
struct ClaimLease<'a> {
    queue: &'a QueueStore,
    ids: Vec<u64>,
}

impl Drop for ClaimLease<'_> {
    fn drop(&mut self) {
        self.queue.release(&self.ids);
    }
}

async fn with_timeout<F: Future>(
    stage: &'static str,
    after: Duration,
    future: F,
) -> Result<F::Output, ItemError> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| ItemError::Timeout { stage, after })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_stage() {
        let err = ItemError::Timeout {
            stage: "upload",
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "upload timed out after 30s");
    }

    #[test]
    fn test_download_errors_keep_status() {
        let err = ItemError::from(DownloadError::Status(404));
        assert_eq!(err.to_string(), "Download failed: HTTP 404");
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result = with_timeout(
            "record write",
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert!(matches!(
            result,
            Err(ItemError::Timeout {
                stage: "record write",
                ..
            })
        ));
    }
}
