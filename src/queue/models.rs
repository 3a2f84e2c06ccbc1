use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{Config, default_column, default_max_attempts};
use crate::worker::paths::derive_file_name;

/// Lifecycle of a queue item
///
/// `pending -> processing -> completed`, or back to `pending` on a retryable
/// failure, or `failed` once attempts are exhausted. `completed` and `failed`
/// only leave through an operator reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

/// One file to mirror into object storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u64,
    pub file_url: String,
    /// Requested destination; replaced by the computed path once completed
    pub storage_path: String,
    pub bucket: String,
    pub table_name: String,
    pub record_id: String,
    pub column_name: String,
    pub status: QueueStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl QueueItem {
    pub fn file_name(&self) -> Option<String> {
        let requested = Some(self.storage_path.as_str()).filter(|p| !p.is_empty());
        derive_file_name(requested, &self.file_url)
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Enqueue request; unset fields are filled from the table's target config
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct NewQueueItem {
    #[builder(into)]
    pub file_url: String,
    #[builder(into)]
    pub table_name: String,
    #[builder(into)]
    pub record_id: String,
    #[serde(default)]
    #[builder(into)]
    pub storage_path: Option<String>,
    #[serde(default)]
    #[builder(into)]
    pub bucket: Option<String>,
    #[serde(default)]
    #[builder(into)]
    pub column_name: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl NewQueueItem {
    /// Fill bucket, column and attempt ceiling from configuration
    pub fn with_defaults(mut self, config: &Config) -> Self {
        if self.bucket.as_deref().is_none_or(str::is_empty) {
            self.bucket = Some(config.bucket_for(&self.table_name));
        }
        if self.column_name.as_deref().is_none_or(str::is_empty) {
            self.column_name = Some(config.column_for(&self.table_name));
        }
        if self.max_attempts.is_none() {
            self.max_attempts = Some(config.worker.max_attempts);
        }
        self
    }

    pub(crate) fn bucket_or_default(&self) -> String {
        self.bucket.clone().unwrap_or_default()
    }

    pub(crate) fn column_or_default(&self) -> String {
        self.column_name.clone().unwrap_or_else(default_column)
    }

    pub(crate) fn max_attempts_or_default(&self) -> u32 {
        self.max_attempts.unwrap_or_else(default_max_attempts)
    }
}

/// Result of processing a claimed item
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Completed { storage_path: String },
    Failed { error: String },
}

/// Item counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }

    pub(crate) fn bump(&mut self, status: QueueStatus) {
        match status {
            QueueStatus::Pending => self.pending += 1,
            QueueStatus::Processing => self.processing += 1,
            QueueStatus::Completed => self.completed += 1,
            QueueStatus::Failed => self.failed += 1,
        }
    }
}
