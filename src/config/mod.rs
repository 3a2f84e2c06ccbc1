//! Configuration management for docmirror
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use docmirror::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Worker claims up to {} items", config.worker.batch_size);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `DOCMIRROR__<section>__<key>`
//!
//! Examples:
//! - `DOCMIRROR__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `DOCMIRROR__WORKER__MAX_FILE_BYTES=20MB`
//! - `DOCMIRROR__DRIVER__SERVER_URL=https://mirror.internal:8080`
//!
//! Secrets come from the environment only: `S3_ACCESS_KEY`, `S3_SECRET_KEY`,
//! `DOCMIRROR_ADMIN_TOKEN` and `DOCMIRROR_TOKEN`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/docmirror.toml`.
//! This can be overridden using the `DOCMIRROR_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AuthConfig, Config, DriverSettings, Principal, RetentionConfig, Role, ServerConfig,
    StorageConfig, StorageProvider, TargetConfig, TelemetryConfig, WorkerSettings,
};
pub(crate) use models::{default_column, default_max_attempts};
pub use validation::{MAX_BATCH_SIZE, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[storage]
provider = "memory"
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[driver]
batch_delay_ms = 10000
check_delay_ms = 500
            "#,
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError(
                ValidationError::CheckDelayShorterThanBatchDelay { .. }
            ))
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
data_dir = "data"
max_request_bytes = "2MB"
max_concurrent_invocations = 2

[storage]
provider = "local"
root = "data/objects"
default_bucket = "documents"
public_base_url = "https://files.example.org/public"

[worker]
batch_size = 100
max_attempts = 3
probe_timeout_secs = 10
fetch_timeout_secs = 30
upload_timeout_secs = 30
max_file_bytes = "50MB"

[driver]
batch_delay_ms = 2000
check_delay_ms = 30000
heartbeat_ms = 10000

[targets.parliament_documents]
category = "parliament"

[targets.government_decrees]
category = "government"
bucket = "decrees"
column = "attachments"

[[auth.principals]]
name = "ops"
token = "ops-token"
role = "admin"

[retention]
activity_ttl_days = 14

[telemetry]
log_filter = "docmirror=debug,info"
stall_after_secs = 600
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.max_request_bytes, ByteSize::mib(2));
        assert_eq!(config.server.max_concurrent_invocations, 2);
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.bucket_for("government_decrees"), "decrees");
        assert_eq!(config.column_for("government_decrees"), "attachments");
        assert_eq!(config.category_for("parliament_documents"), "parliament");
        assert_eq!(config.retention.activity_ttl_days, 14);
        assert_eq!(config.telemetry.stall_after_secs, 600);
    }
}
