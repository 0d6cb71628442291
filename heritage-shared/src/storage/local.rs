/// Filesystem-backed media store
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use super::{generate_stored_name, is_safe_stored_name, sha256_hex, MediaStore, StorageError, StoredFile};

/// Writes files flat under `root`; URLs are `public_prefix/stored_name`
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let public_prefix = public_prefix.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_prefix,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if needed
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn path_for(&self, stored_name: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_stored_name(stored_name) {
            return Err(StorageError::InvalidName(stored_name.to_string()));
        }
        Ok(self.root.join(stored_name))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn save(&self, original_name: &str, data: Bytes) -> Result<StoredFile, StorageError> {
        self.ensure_root().await?;

        let stored_name = generate_stored_name(original_name);
        let path = self.path_for(&stored_name)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&data).await?;
        file.flush().await?;

        tracing::debug!(stored_name = %stored_name, size = data.len(), "Media file written");

        Ok(StoredFile {
            url: format!("{}/{}", self.public_prefix, stored_name),
            size_bytes: data.len() as i64,
            sha256: sha256_hex(&data),
            stored_name,
        })
    }

    async fn delete(&self, stored_name: &str) -> Result<(), StorageError> {
        let path = self.path_for(stored_name)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(stored_name, "Media file already missing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
