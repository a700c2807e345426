//! Binary storage collaborator.
//!
//! The registry treats this as the sole durable home of artifact bytes:
//! `put` writes a blob under an artifact id and returns the storage key,
//! `get`/`delete` resolve the same key internally. Replacement goes
//! through a temporary file followed by an atomic rename, so a
//! concurrent reader never observes a truncated or half-written binary.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use skylift_schema::ArtifactId;

/// Failures of the binary store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The upload exceeds the configured ceiling.
    #[error("binary is {size} bytes, over the {limit} byte upload limit")]
    TooLarge {
        /// Size of the rejected upload.
        size: u64,
        /// The configured ceiling.
        limit: u64,
    },

    /// No blob stored under this id.
    #[error("no stored binary for artifact {0}")]
    Missing(String),

    /// Remote object store failure.
    #[cfg(feature = "s3")]
    #[error("remote store: {0}")]
    Remote(String),
}

/// Durable home of artifact bytes.
#[async_trait]
pub trait BinaryStore: Send + Sync {
    /// Store (or atomically replace) the blob for an artifact.
    ///
    /// Returns the storage key the blob lives under.
    ///
    /// # Errors
    ///
    /// [`StoreError::TooLarge`] over the upload ceiling, otherwise the
    /// underlying storage failure.
    async fn put(&self, id: ArtifactId, bytes: &[u8]) -> Result<String, StoreError>;

    /// Fetch the blob for an artifact.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] when nothing is stored under the id.
    async fn get(&self, id: ArtifactId) -> Result<Vec<u8>, StoreError>;

    /// Remove the blob for an artifact.
    ///
    /// # Errors
    ///
    /// [`StoreError::Missing`] when nothing is stored under the id.
    async fn delete(&self, id: ArtifactId) -> Result<(), StoreError>;
}

/// Local filesystem store: one `<id>.ipa` file per artifact.
#[derive(Debug)]
pub struct FsStore {
    dir: PathBuf,
    max_bytes: u64,
}

impl FsStore {
    /// Open (and create) the store directory.
    ///
    /// # Errors
    ///
    /// Returns the directory creation failure.
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, max_bytes })
    }

    fn key(id: ArtifactId) -> String {
        format!("{id}.ipa")
    }

    fn path(&self, id: ArtifactId) -> PathBuf {
        self.dir.join(Self::key(id))
    }
}

#[async_trait]
impl BinaryStore for FsStore {
    async fn put(&self, id: ArtifactId, bytes: &[u8]) -> Result<String, StoreError> {
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(StoreError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        // Temp file in the store directory itself: same volume, so the
        // final persist is a rename, not a copy.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(self.path(id)).map_err(|e| e.error)?;
        Ok(Self::key(id))
    }

    async fn get(&self, id: ArtifactId) -> Result<Vec<u8>, StoreError> {
        std::fs::read(self.path(id)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::Missing(id.to_string())
            } else {
                StoreError::Io(e)
            }
        })
    }

    async fn delete(&self, id: ArtifactId) -> Result<(), StoreError> {
        std::fs::remove_file(self.path(id)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::Missing(id.to_string())
            } else {
                StoreError::Io(e)
            }
        })
    }
}

/// S3-compatible store (R2, MinIO) behind the same collaborator trait.
#[cfg(feature = "s3")]
pub mod s3 {
    use super::{BinaryStore, StoreError};
    use async_trait::async_trait;
    use aws_sdk_s3 as s3;
    use skylift_schema::ArtifactId;

    /// Configuration for the remote store.
    #[derive(Debug, Clone)]
    pub struct S3Config {
        /// S3-compatible endpoint.
        pub endpoint: String,
        /// Access key id.
        pub access_key: String,
        /// Secret access key.
        pub secret_key: String,
        /// Bucket name.
        pub bucket: String,
    }

    impl S3Config {
        /// Load from `SKYLIFT_S3_*` environment variables; `None` when
        /// the endpoint is not configured.
        pub fn from_env() -> Option<Self> {
            Some(Self {
                endpoint: std::env::var("SKYLIFT_S3_ENDPOINT").ok()?,
                access_key: std::env::var("SKYLIFT_S3_ACCESS_KEY").ok()?,
                secret_key: std::env::var("SKYLIFT_S3_SECRET_KEY").ok()?,
                bucket: std::env::var("SKYLIFT_S3_BUCKET")
                    .unwrap_or_else(|_| "skylift-artifacts".to_string()),
            })
        }
    }

    /// Client for the remote store.
    #[derive(Debug)]
    pub struct S3Store {
        client: s3::Client,
        bucket: String,
        max_bytes: u64,
    }

    impl S3Store {
        /// Build a client for the configured bucket.
        pub fn new(config: &S3Config, max_bytes: u64) -> Self {
            let credentials = s3::config::Credentials::new(
                &config.access_key,
                &config.secret_key,
                None,
                None,
                "skylift-blob-store",
            );
            let s3_config = s3::Config::builder()
                .behavior_version_latest()
                .endpoint_url(&config.endpoint)
                .region(s3::config::Region::new("auto"))
                .credentials_provider(credentials)
                .force_path_style(true)
                .build();
            Self {
                client: s3::Client::from_conf(s3_config),
                bucket: config.bucket.clone(),
                max_bytes,
            }
        }

        fn key(id: ArtifactId) -> String {
            format!("ipa/{id}.ipa")
        }
    }

    #[async_trait]
    impl BinaryStore for S3Store {
        async fn put(&self, id: ArtifactId, bytes: &[u8]) -> Result<String, StoreError> {
            let size = bytes.len() as u64;
            if size > self.max_bytes {
                return Err(StoreError::TooLarge {
                    size,
                    limit: self.max_bytes,
                });
            }
            let key = Self::key(id);
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(s3::primitives::ByteStream::from(bytes.to_vec()))
                .content_type("application/octet-stream")
                .send()
                .await
                .map_err(|e| StoreError::Remote(e.to_string()))?;
            Ok(key)
        }

        async fn get(&self, id: ArtifactId) -> Result<Vec<u8>, StoreError> {
            let response = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(Self::key(id))
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error().is_some_and(|s| s.is_no_such_key()) {
                        StoreError::Missing(id.to_string())
                    } else {
                        StoreError::Remote(e.to_string())
                    }
                })?;
            let bytes = response
                .body
                .collect()
                .await
                .map_err(|e| StoreError::Remote(e.to_string()))?;
            Ok(bytes.to_vec())
        }

        async fn delete(&self, id: ArtifactId) -> Result<(), StoreError> {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(Self::key(id))
                .send()
                .await
                .map_err(|e| StoreError::Remote(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path(), 1024).unwrap();
        let id = ArtifactId::from_millis(1);

        store.put(id, b"payload").await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), b"payload");

        store.delete(id).await.unwrap();
        assert!(matches!(
            store.get(id).await,
            Err(StoreError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_put_replaces_atomically() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path(), 1024).unwrap();
        let id = ArtifactId::from_millis(2);

        store.put(id, b"old").await.unwrap();
        store.put(id, b"new").await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), b"new");

        // No stray temp files survive the swap.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_none_or(|ext| ext != "ipa"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_put_enforces_ceiling() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path(), 4).unwrap();
        let err = store
            .put(ArtifactId::from_millis(3), b"too big")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { size: 7, limit: 4 }));
    }

    #[tokio::test]
    async fn test_delete_missing_is_reported() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path(), 1024).unwrap();
        assert!(matches!(
            store.delete(ArtifactId::from_millis(9)).await,
            Err(StoreError::Missing(_))
        ));
    }
}
