use super::models::{Config, StorageProvider};
use std::collections::HashSet;
use thiserror::Error;

/// Hard ceiling on items claimed per worker invocation
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("worker.batch_size must be between 1 and {max}, got {actual}")]
    InvalidBatchSize { actual: usize, max: usize },

    #[error("worker.max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("Timeout must be positive: {field}")]
    ZeroTimeout { field: &'static str },

    #[error("worker.stale_after_secs ({stale_after}) must exceed the worst-case batch time ({batch_deadline}s)")]
    StaleAfterWithinBatch { stale_after: u64, batch_deadline: u64 },

    #[error("driver.check_delay_ms ({check}) must not be shorter than driver.batch_delay_ms ({batch})")]
    CheckDelayShorterThanBatchDelay { check: u64, batch: u64 },

    #[error("driver.heartbeat_ms must be positive")]
    InvalidHeartbeat,

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("Bucket name must not be empty: {context}")]
    EmptyBucket { context: String },

    #[error("Principal '{name}' has an empty token")]
    EmptyToken { name: String },

    #[error("Token for principal '{name}' is shared with another principal")]
    DuplicateToken { name: String },

    #[error("Retention TTL must be positive: {field} = {value}")]
    InvalidRetentionTTL { field: String, value: u32 },

    #[error("server.max_concurrent_invocations must be positive")]
    InvalidConcurrency,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_driver(config)?;
    validate_storage(config)?;
    validate_auth(config)?;
    validate_retention(config)?;

    if config.server.max_concurrent_invocations == 0 {
        return Err(ValidationError::InvalidConcurrency);
    }

    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    let worker = &config.worker;

    if worker.batch_size == 0 || worker.batch_size > MAX_BATCH_SIZE {
        return Err(ValidationError::InvalidBatchSize {
            actual: worker.batch_size,
            max: MAX_BATCH_SIZE,
        });
    }

    if worker.max_attempts == 0 {
        return Err(ValidationError::InvalidMaxAttempts);
    }

    let timeouts = [
        ("worker.connect_timeout_secs", worker.connect_timeout_secs),
        ("worker.probe_timeout_secs", worker.probe_timeout_secs),
        ("worker.fetch_timeout_secs", worker.fetch_timeout_secs),
        ("worker.upload_timeout_secs", worker.upload_timeout_secs),
        ("worker.record_timeout_secs", worker.record_timeout_secs),
        ("worker.stale_after_secs", worker.stale_after_secs),
    ];
    if let Some(&(field, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
        return Err(ValidationError::ZeroTimeout { field });
    }

    let batch_deadline = worker.batch_deadline().as_secs();
    if worker.stale_after_secs <= batch_deadline {
        return Err(ValidationError::StaleAfterWithinBatch {
            stale_after: worker.stale_after_secs,
            batch_deadline,
        });
    }

    Ok(())
}

/// Starvation backoff has to be at least as long as the inter-batch delay
fn validate_driver(config: &Config) -> Result<(), ValidationError> {
    let driver = &config.driver;

    if driver.check_delay_ms < driver.batch_delay_ms {
        return Err(ValidationError::CheckDelayShorterThanBatchDelay {
            check: driver.check_delay_ms,
            batch: driver.batch_delay_ms,
        });
    }

    if driver.heartbeat_ms == 0 {
        return Err(ValidationError::InvalidHeartbeat);
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }

    if config.storage.default_bucket.trim().is_empty() {
        return Err(ValidationError::EmptyBucket {
            context: "storage.default_bucket".to_string(),
        });
    }

    for (table, target) in &config.targets {
        if matches!(&target.bucket, Some(bucket) if bucket.trim().is_empty()) {
            return Err(ValidationError::EmptyBucket {
                context: format!("targets.{table}.bucket"),
            });
        }
    }

    Ok(())
}

fn validate_auth(config: &Config) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for principal in &config.auth.principals {
        if principal.token.trim().is_empty() {
            return Err(ValidationError::EmptyToken {
                name: principal.name.clone(),
            });
        }
        if !seen.insert(principal.token.as_str()) {
            return Err(ValidationError::DuplicateToken {
                name: principal.name.clone(),
            });
        }
    }

    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.activity_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "activity_ttl_days".to_string(),
            value: 0,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::models::*;
    use super::*;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.auth.principals.push(Principal {
            name: "ops".to_string(),
            token: "ops-token".to_string(),
            role: Role::Admin,
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&create_test_config()).is_ok());
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = create_test_config();
        config.worker.batch_size = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBatchSize { actual: 0, .. })
        ));

        config.worker.batch_size = MAX_BATCH_SIZE + 1;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBatchSize { .. })
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = create_test_config();
        config.worker.max_attempts = 0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidMaxAttempts)));
    }

    #[test]
    fn test_zero_timeout_names_field() {
        let mut config = create_test_config();
        config.worker.upload_timeout_secs = 0;

        match validate(&config) {
            Err(ValidationError::ZeroTimeout { field }) => {
                assert_eq!(field, "worker.upload_timeout_secs")
            }
            other => panic!("expected ZeroTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_after_must_outlast_a_batch() {
        let mut config = create_test_config();
        assert!(config.worker.stale_after() > config.worker.batch_deadline());

        config.worker.stale_after_secs = config.worker.batch_deadline().as_secs();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::StaleAfterWithinBatch { .. })
        ));

        // Smaller batches bring the bound down
        config.worker.batch_size = 10;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_check_delay_must_cover_batch_delay() {
        let mut config = create_test_config();
        config.driver.batch_delay_ms = 5_000;
        config.driver.check_delay_ms = 1_000;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::CheckDelayShorterThanBatchDelay { .. })
        ));
    }

    #[test]
    fn test_s3_credentials_missing() {
        let mut config = create_test_config();
        config.storage.provider = StorageProvider::S3;
        config.storage.secret_key = Some("secret".to_string());

        assert!(matches!(validate(&config), Err(ValidationError::MissingS3Credentials)));
    }

    #[test]
    fn test_duplicate_tokens_rejected() {
        let mut config = create_test_config();
        config.auth.principals.push(Principal {
            name: "dash".to_string(),
            token: "ops-token".to_string(),
            role: Role::Viewer,
        });

        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateToken { name }) if name == "dash"
        ));
    }

    #[test]
    fn test_empty_target_bucket_rejected() {
        let mut config = create_test_config();
        config.targets.insert(
            "decrees".to_string(),
            TargetConfig {
                bucket: Some(" ".to_string()),
                ..Default::default()
            },
        );

        assert!(matches!(validate(&config), Err(ValidationError::EmptyBucket { .. })));
    }

    #[test]
    fn test_zero_retention_ttl() {
        let mut config = create_test_config();
        config.retention.activity_ttl_days = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidRetentionTTL { .. })
        ));
    }
}
