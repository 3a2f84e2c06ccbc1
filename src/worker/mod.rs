//! Download worker
//!
//! A stateless batch worker: each invocation claims pending queue items,
//! fetches every file, uploads it under a deterministic path, merges its
//! metadata into the owning record and finalizes the item.

pub mod http;
pub mod paths;
pub mod runner;

pub use runner::{BatchOutcome, BatchWorker, ItemError};

use thiserror::Error;

use crate::queue::QueueError;
use http::DownloadError;

/// Failure of a whole invocation, as opposed to a single item
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] DownloadError),
}
