mod local;

pub use local::LocalBlobStore;

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Invalid blob name: {0:?}")]
    InvalidName(String),
}

pub type BlobWriter = Pin<Box<dyn AsyncWrite + Send>>;
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Abstraction over the directory holding uploaded book bytes.
/// Names are generated by the book service and are a single path segment.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create (or truncate) a blob and return a writer for its content.
    async fn create(&self, name: &str) -> Result<BlobWriter, BlobStoreError>;
    async fn open(&self, name: &str) -> Result<BlobReader, BlobStoreError>;
    /// Remove a blob. A blob that is already gone is not an error.
    async fn remove(&self, name: &str) -> Result<(), BlobStoreError>;
    /// Not used by the book service; for operators and tests checking the
    /// upload directory.
    async fn exists(&self, name: &str) -> Result<bool, BlobStoreError>;
}
