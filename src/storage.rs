//! Object storage for uploads and generated reports
//!
//! Objects are addressed by `bucket` + `key`. `LocalObjectStore` maps them
//! onto `<root>/<bucket>/<key>` on the local filesystem.

use crate::error::StorageError;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub trait ObjectStore: Send + Sync {
    fn get(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<Vec<u8>, StorageError>> + Send;

    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Location string reported back to callers
    fn uri(&self, bucket: &str, key: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        if bucket.is_empty() || !is_plain_relative(Path::new(bucket)) || bucket.contains('/') {
            return Err(StorageError::InvalidKey(bucket.to_string()));
        }
        if key.is_empty() || !is_plain_relative(Path::new(key)) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(bucket).join(key))
    }
}

/// Only normal components: no root, no `..`, no `.`
fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        debug!("Reading object {:?}", path);

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("Writing {} bytes to {:?}", body.len(), path);
        tokio::fs::write(&path, body).await?;
        Ok(())
    }

    fn uri(&self, bucket: &str, key: &str) -> String {
        self.root.join(bucket).join(key).display().to_string()
    }
}
