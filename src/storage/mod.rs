//! Object storage for mirrored files
//! Uses Apache Arrow object_store crate, one store per bucket

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, PutPayload, path::Path as StoragePath};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub etag: Option<String>,
    pub size: usize,
}

/// Bucket-addressable storage client
///
/// Stores are built lazily on first use of a bucket and cached.
#[derive(Clone)]
pub struct StorageClient {
    config: Arc<StorageConfig>,
    stores: Arc<RwLock<HashMap<String, Arc<dyn ObjectStore>>>>,
}

impl StorageClient {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config: Arc::new(config),
            stores: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        if bucket.trim().is_empty() {
            return Err(StorageError::Config("bucket name is empty".to_string()));
        }

        if let Some(store) = self
            .stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bucket)
        {
            return Ok(Arc::clone(store));
        }

        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let store = self.build_store(bucket)?;
        stores.insert(bucket.to_string(), Arc::clone(&store));
        tracing::debug!(bucket, provider = ?self.config.provider, "Object store created");
        Ok(store)
    }

    fn build_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let store: Arc<dyn ObjectStore> = match self.config.provider {
            StorageProvider::Memory => Arc::new(InMemory::new()),
            StorageProvider::Local => {
                let dir = self.bucket_dir(bucket);
                std::fs::create_dir_all(&dir)?;
                Arc::new(LocalFileSystem::new_with_prefix(&dir)?)
            }
            StorageProvider::S3 => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_region(self.region())
                    .with_bucket_name(bucket);

                if let Some(ref endpoint) = self.config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint.clone())
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                if let Some(ref key) = self.config.access_key {
                    builder = builder.with_access_key_id(key.clone());
                }
                if let Some(ref secret) = self.config.secret_key {
                    builder = builder.with_secret_access_key(secret.clone());
                }

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| StorageError::Config(e.to_string()))?,
                )
            }
        };

        Ok(store)
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.config.root.join(bucket)
    }

    fn region(&self) -> String {
        self.config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string())
    }

    /// Upload bytes, replacing any existing object at the same key
    pub async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<UploadMetadata> {
        let store = self.store_for(bucket)?;
        let path = StoragePath::from(key);
        let size = data.len();
        let start = std::time::Instant::now();

        let put_result = store.put(&path, PutPayload::from(data)).await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket,
                key,
                size_bytes = size,
                "Storage upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket,
            key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Uploaded to storage"
        );

        Ok(UploadMetadata {
            etag: put_result.e_tag,
            size,
        })
    }

    /// Public URL of an object
    ///
    /// `public_base_url/{bucket}/{key}` when configured, otherwise derived
    /// from the provider.
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        if let Some(ref base) = self.config.public_base_url {
            return format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key);
        }

        match self.config.provider {
            StorageProvider::Memory => format!("memory://{bucket}/{key}"),
            StorageProvider::Local => {
                format!("file://{}", self.bucket_dir(bucket).join(key).display())
            }
            StorageProvider::S3 => match self.config.endpoint {
                Some(ref endpoint) => {
                    format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
                }
                None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region(), key),
            },
        }
    }
}
