use thiserror::Error;

use crate::queue::NewQueueItem;

pub const MAX_ENQUEUE_ITEMS: usize = 1000;
const MAX_ATTEMPTS_CEILING: u32 = 100;

#[derive(Debug, Error)]
pub enum EnqueueValidationError {
    #[error("items must contain between 1 and {} entries", MAX_ENQUEUE_ITEMS)]
    InvalidItemCount,
    #[error("item {0}: file_url must be an http/https url")]
    InvalidFileUrl(usize),
    #[error("item {0}: table_name must be non-empty [A-Za-z0-9_]")]
    InvalidTableName(usize),
    #[error("item {0}: record_id must be non-empty and must not contain '/'")]
    InvalidRecordId(usize),
    #[error("item {0}: {1} must not be empty when present")]
    EmptyField(usize, &'static str),
    #[error("item {0}: max_attempts must be between 1 and {}", MAX_ATTEMPTS_CEILING)]
    InvalidMaxAttempts(usize),
}

/// Shape checks on an enqueue request before anything is written
pub fn validate_enqueue(items: &[NewQueueItem]) -> Result<(), EnqueueValidationError> {
    if !(1..=MAX_ENQUEUE_ITEMS).contains(&items.len()) {
        return Err(EnqueueValidationError::InvalidItemCount);
    }

    for (index, item) in items.iter().enumerate() {
        if !item.file_url.starts_with("http://") && !item.file_url.starts_with("https://") {
            return Err(EnqueueValidationError::InvalidFileUrl(index));
        }

        let table_ok = !item.table_name.is_empty()
            && item
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !table_ok {
            return Err(EnqueueValidationError::InvalidTableName(index));
        }

        if item.record_id.trim().is_empty() || item.record_id.contains('/') {
            return Err(EnqueueValidationError::InvalidRecordId(index));
        }

        for (field, value) in [
            ("bucket", &item.bucket),
            ("column_name", &item.column_name),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(EnqueueValidationError::EmptyField(index, field));
            }
        }

        if item
            .max_attempts
            .is_some_and(|n| n == 0 || n > MAX_ATTEMPTS_CEILING)
        {
            return Err(EnqueueValidationError::InvalidMaxAttempts(index));
        }
    }

    Ok(())
}
