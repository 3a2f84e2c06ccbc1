use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub driver: DriverSettings,
    /// Per-table ingestion targets, keyed by table name
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Logical category for a table; falls back to the table name itself
    pub fn category_for(&self, table: &str) -> String {
        self.targets
            .get(table)
            .and_then(|t| t.category.clone())
            .unwrap_or_else(|| table.to_string())
    }

    /// Bucket used when an enqueued item does not name one
    pub fn bucket_for(&self, table: &str) -> String {
        self.targets
            .get(table)
            .and_then(|t| t.bucket.clone())
            .unwrap_or_else(|| self.storage.default_bucket.clone())
    }

    /// Metadata column used when an enqueued item does not name one
    pub fn column_for(&self, table: &str) -> String {
        self.targets
            .get(table)
            .and_then(|t| t.column.clone())
            .unwrap_or_else(default_column)
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Root directory for the fjall keyspaces (queue/, ledger/, records/)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: ByteSize,
    #[serde(default = "default_max_concurrent_invocations")]
    pub max_concurrent_invocations: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
            max_request_bytes: default_max_request_bytes(),
            max_concurrent_invocations: default_max_concurrent_invocations(),
        }
    }
}

impl ServerConfig {
    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("queue")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records")
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_request_bytes() -> ByteSize {
    ByteSize::mib(5)
}

fn default_max_concurrent_invocations() -> usize {
    4
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
    S3,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Filesystem root for the local provider; each bucket is a subdirectory
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_bucket")]
    pub default_bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Base for public object URLs: `{public_base_url}/{bucket}/{path}`
    pub public_base_url: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            root: default_storage_root(),
            default_bucket: default_bucket(),
            endpoint: None,
            region: None,
            public_base_url: None,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/objects")
}

fn default_bucket() -> String {
    "documents".to_string()
}

pub(crate) fn default_column() -> String {
    "local_files".to_string()
}

/// Batch worker policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_record_timeout_secs")]
    pub record_timeout_secs: u64,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: ByteSize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Orphaned claims older than this are returned to `pending`; must exceed
    /// `batch_deadline()`
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            connect_timeout_secs: default_connect_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            record_timeout_secs: default_record_timeout_secs(),
            max_file_bytes: default_max_file_bytes(),
            user_agent: default_user_agent(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl WorkerSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn record_timeout(&self) -> Duration {
        Duration::from_secs(self.record_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Worst-case wall time of one full batch
    pub fn batch_deadline(&self) -> Duration {
        let per_item = self.probe_timeout_secs
            + self.fetch_timeout_secs
            + self.upload_timeout_secs
            + 2 * self.record_timeout_secs;
        Duration::from_secs(per_item.saturating_mul(self.batch_size as u64))
    }
}

fn default_batch_size() -> usize {
    100
}

pub(crate) fn default_max_attempts() -> u32 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    15
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_upload_timeout_secs() -> u64 {
    30
}

fn default_record_timeout_secs() -> u64 {
    10
}

fn default_max_file_bytes() -> ByteSize {
    ByteSize::mib(50)
}

fn default_user_agent() -> String {
    format!("docmirror/{}", env!("CARGO_PKG_VERSION"))
}

fn default_stale_after_secs() -> u64 {
    3 * 60 * 60
}

/// Driver loop cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverSettings {
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_check_delay_ms")]
    pub check_delay_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Worker host to drive; `None` drives the local stores in-process
    pub server_url: Option<String>,
    /// Bearer token for the worker host (loaded from environment)
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            batch_delay_ms: default_batch_delay_ms(),
            check_delay_ms: default_check_delay_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            server_url: None,
            token: None,
            actor: default_actor(),
        }
    }
}

impl DriverSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn check_delay(&self) -> Duration {
        Duration::from_millis(self.check_delay_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_batch_delay_ms() -> u64 {
    2_000
}

fn default_check_delay_ms() -> u64 {
    30_000
}

fn default_heartbeat_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

fn default_actor() -> String {
    "docmirror-cli".to_string()
}

/// Per-table target overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Leading storage path segment; defaults to the table name
    pub category: Option<String>,
    pub bucket: Option<String>,
    pub column: Option<String>,
}

/// Principal role for the admin API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Viewer,
}

/// Bearer-token principal
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Principal {
    pub name: String,
    pub token: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub principals: Vec<Principal>,
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_activity_ttl_days")]
    pub activity_ttl_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            activity_ttl_days: default_activity_ttl_days(),
        }
    }
}

fn default_activity_ttl_days() -> u32 {
    30
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// A running control record with pending work and no batch for this long is stalled
    #[serde(default = "default_stall_after_secs")]
    pub stall_after_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            stall_after_secs: default_stall_after_secs(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_stall_after_secs() -> u64 {
    300
}
