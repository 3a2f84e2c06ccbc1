//! Target document records and the file-metadata merge rule
//!
//! The worker only needs two operations on an owning row: read one column and
//! write it back. [`RecordStore`] is that seam; [`FjallRecords`] is the
//! embedded implementation used by the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {table}/{id}")]
    NotFound { table: String, id: String },

    #[error("Record {table}/{id} is not a JSON object")]
    NotAnObject { table: String, id: String },
}

pub type Result<T> = std::result::Result<T, RecordError>;

/// Metadata of one mirrored file, stored in the owning record's array column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub url: String,
    pub original_url: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Read/write access to one column of a target record
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Current column value; `None` when the column is absent or null.
    /// Fails with `NotFound` when the record itself does not exist.
    async fn read_column(&self, table: &str, id: &str, column: &str) -> Result<Option<Value>>;

    async fn write_column(&self, table: &str, id: &str, column: &str, value: Value) -> Result<()>;
}

/// Merge a new file into an existing column value
///
/// An entry with the same `name` is replaced in place; otherwise the file is
/// appended. Anything that is not an array is discarded and replaced by a
/// one-element array.
pub fn merge_file_metadata(existing: Option<Value>, file: &FileMetadata) -> Result<Value> {
    let new_entry = serde_json::to_value(file)?;

    let mut entries = match existing {
        Some(Value::Array(entries)) => entries,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!(discarded = %other, "Replacing non-array file column");
            Vec::new()
        }
    };

    let position = entries
        .iter()
        .position(|entry| entry.get("name").and_then(Value::as_str) == Some(file.name.as_str()));

    match position {
        Some(index) => entries[index] = new_entry,
        None => entries.push(new_entry),
    }

    Ok(Value::Array(entries))
}

/// Target records kept in a fjall partition, keyed `{table}/{id}`
#[derive(Clone)]
pub struct FjallRecords {
    keyspace: Keyspace,
    records: PartitionHandle,
}

impl FjallRecords {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening record store at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;
        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;

        Ok(Self { keyspace, records })
    }

    /// Insert or replace a whole record
    pub fn put_record(&self, table: &str, id: &str, record: Value) -> Result<()> {
        if !record.is_object() {
            return Err(RecordError::NotAnObject {
                table: table.to_string(),
                id: id.to_string(),
            });
        }

        self.records
            .insert(record_key(table, id), serde_json::to_vec(&record)?)?;
        debug!(table, id, "Record stored");
        Ok(())
    }

    pub fn get_record(&self, table: &str, id: &str) -> Result<Option<Value>> {
        match self.records.get(record_key(table, id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn require_object(&self, table: &str, id: &str) -> Result<Map<String, Value>> {
        let not_found = || RecordError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        };

        match self.get_record(table, id)?.ok_or_else(not_found)? {
            Value::Object(map) => Ok(map),
            _ => Err(RecordError::NotAnObject {
                table: table.to_string(),
                id: id.to_string(),
            }),
        }
    }

    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FjallRecords {
    async fn read_column(&self, table: &str, id: &str, column: &str) -> Result<Option<Value>> {
        let record = self.require_object(table, id)?;
        Ok(record.get(column).filter(|v| !v.is_null()).cloned())
    }

    async fn write_column(&self, table: &str, id: &str, column: &str, value: Value) -> Result<()> {
        let mut record = self.require_object(table, id)?;
        record.insert(column.to_string(), value);

        self.records
            .insert(record_key(table, id), serde_json::to_vec(&Value::Object(record))?)?;
        debug!(table, id, column, "Record column written");
        Ok(())
    }
}

fn record_key(table: &str, id: &str) -> Vec<u8> {
    format!("{table}/{id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn file(name: &str, size: u64) -> FileMetadata {
        FileMetadata {
            name: name.to_string(),
            url: format!("https://files.example/documents/{name}"),
            original_url: format!("https://source.example/{name}"),
            size_bytes: size,
            mime_type: "application/pdf".to_string(),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_replaces_entry_with_same_name() {
        let existing = json!([
            {"name": "x.pdf", "url": "old", "size_bytes": 1},
            {"name": "y.pdf", "url": "keep"}
        ]);

        let merged = merge_file_metadata(Some(existing), &file("x.pdf", 99)).unwrap();
        let entries = merged.as_array().unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "x.pdf");
        assert_eq!(entries[0]["size_bytes"], 99);
        assert_eq!(entries[1]["url"], "keep");
    }

    #[test]
    fn test_merge_appends_new_name() {
        let existing = json!([{"name": "x.pdf"}]);
        let merged = merge_file_metadata(Some(existing), &file("z.pdf", 1)).unwrap();

        let names: Vec<&str> = merged
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["name"].as_str())
            .collect();
        assert_eq!(names, vec!["x.pdf", "z.pdf"]);
    }

    #[test]
    fn test_merge_discards_non_array_values() {
        for existing in [None, Some(Value::Null), Some(json!("garbage")), Some(json!({"name": "x.pdf"}))] {
            let merged = merge_file_metadata(existing, &file("x.pdf", 5)).unwrap();
            let entries = merged.as_array().unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0]["size_bytes"], 5);
        }
    }

    #[tokio::test]
    async fn test_fjall_records_column_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let records = FjallRecords::open(temp_dir.path()).unwrap();

        records
            .put_record("decrees", "7", json!({"id": "7", "title": "Decree 7"}))
            .unwrap();

        assert_eq!(records.read_column("decrees", "7", "local_files").await.unwrap(), None);

        records
            .write_column("decrees", "7", "local_files", json!([{"name": "a.pdf"}]))
            .await
            .unwrap();

        let record = records.get_record("decrees", "7").unwrap().unwrap();
        assert_eq!(record["title"], "Decree 7");
        assert_eq!(record["local_files"][0]["name"], "a.pdf");
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let records = FjallRecords::open(temp_dir.path()).unwrap();

        let err = records
            .write_column("decrees", "404", "local_files", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::NotFound { .. }));

        assert!(matches!(
            records.put_record("decrees", "1", json!([1, 2])),
            Err(RecordError::NotAnObject { .. })
        ));
    }
}
