use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{BlobReader, BlobStore, BlobStoreError, BlobWriter};

/// Local filesystem blob store rooted at the upload directory.
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf, BlobStoreError> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(BlobStoreError::InvalidName(name.to_string()));
        }
        Ok(self.base_path.join(name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn create(&self, name: &str) -> Result<BlobWriter, BlobStoreError> {
        let path = self.blob_path(name)?;
        let file = tokio::fs::File::create(&path).await?;
        Ok(Box::pin(file))
    }

    async fn open(&self, name: &str) -> Result<BlobReader, BlobStoreError> {
        let path = self.blob_path(name)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), BlobStoreError> {
        let path = self.blob_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool, BlobStoreError> {
        let path = self.blob_path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
