//! Request and response bodies of the HTTP API.
//!
//! The surface has three parts:
//! - `POST /functions/process-queue` runs one worker batch and answers with a
//!   [`BatchOutcome`](crate::worker::BatchOutcome) or an [`InvokeErrorResponse`]
//! - `/admin/*` endpoints (admin bearer token) enqueue and inspect items,
//!   drive the run control record and manage target records
//! - `GET /health` is public and returns a [`HealthResponse`]
//!
//! # Enqueue payload
//!
//! `POST /admin/queue` accepts a single item or a list (optionally gzip-encoded):
//!
//! ```json
//! [
//!   {
//!     "file_url": "https://parliament.example/files/bill-7.pdf",
//!     "table_name": "parliament_documents",
//!     "record_id": "rec-42",
//!     "storage_path": "bill-7.pdf",
//!     "bucket": "documents",
//!     "column_name": "local_files",
//!     "max_attempts": 3
//!   }
//! ]
//! ```
//!
//! Only `file_url`, `table_name` and `record_id` are required; the rest
//! default from `targets.<table>` and the worker settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::queue::{NewQueueItem, QueueItem};
use crate::reporting::HealthReport;

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum EnqueuePayload {
    Many(Vec<NewQueueItem>),
    One(NewQueueItem),
}

impl EnqueuePayload {
    pub fn into_items(self) -> Vec<NewQueueItem> {
        match self {
            EnqueuePayload::Many(items) => items,
            EnqueuePayload::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnqueueRejection {
    /// Position in the submitted list
    pub index: usize,
    pub reason: String,
    pub existing_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnqueueResponse {
    pub created: Vec<QueueItem>,
    pub rejected: Vec<EnqueueRejection>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResetFailedResponse {
    pub reset: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StartRequest {
    /// Defaults to the calling principal's name
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordBatchRequest {
    pub processed: u64,
}

/// 500 body of the invoke endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeErrorResponse {
    pub error: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub report: Option<HealthReport>,
    pub components: HashMap<String, String>,
    pub version: String,
}
