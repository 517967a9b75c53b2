use std::fmt;

use thiserror::Error;

use crate::blob_store::BlobStoreError;
use crate::storage::models::{BookFormat, ValidationError};
use crate::storage::DatabaseError;

/// The step of a book operation that talked to a collaborator and failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateBlob,
    WriteBlob,
    ReadBlob,
    RemoveBlob,
    InsertRecord,
    FindRecord,
    SoftDeleteRecord,
    CountRecords,
    PageRecords,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::CreateBlob => "create book file",
            Stage::WriteBlob => "save book file",
            Stage::ReadBlob => "read book content",
            Stage::RemoveBlob => "delete book file",
            Stage::InsertRecord => "save book to database",
            Stage::FindRecord => "look up book",
            Stage::SoftDeleteRecord => "delete book from database",
            Stage::CountRecords => "count books",
            Stage::PageRecords => "fetch books",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum BookError {
    #[error("book title is required")]
    TitleRequired,
    #[error("book title is too long")]
    TitleTooLong,
    #[error("book author is too long")]
    AuthorTooLong,
    #[error("book format is required")]
    FormatRequired,
    #[error("book file path is required")]
    FilePathRequired,
    #[error("unsupported book format")]
    InvalidFormat,
    #[error("book file exceeds size limit of {limit} bytes")]
    FileTooLarge { limit: u64 },
    #[error("book not found: {0}")]
    NotFound(u64),
    #[error("book file not found: {0}")]
    BlobNotFound(String),
    #[error("failed to {stage}: {source}")]
    Io {
        stage: Stage,
        source: BlobStoreError,
    },
    #[error("failed to {stage}: {source}")]
    Persistence {
        stage: Stage,
        source: DatabaseError,
    },
    #[error("unsupported book format: {0}")]
    UnsupportedFormat(BookFormat),
    /// A failed create whose compensating blob removal failed as well.
    #[error("{cause}; removing book file {blob_name} also failed: {cleanup}")]
    CleanupFailed {
        #[source]
        cause: Box<BookError>,
        blob_name: String,
        cleanup: BlobStoreError,
    },
}

impl BookError {
    pub(crate) fn io(stage: Stage) -> impl FnOnce(BlobStoreError) -> BookError {
        move |source| BookError::Io { stage, source }
    }

    pub(crate) fn persistence(stage: Stage) -> impl FnOnce(DatabaseError) -> BookError {
        move |source| BookError::Persistence { stage, source }
    }

    /// Errors caused by the request itself rather than by the service or its stores.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BookError::TitleRequired
                | BookError::TitleTooLong
                | BookError::AuthorTooLong
                | BookError::FormatRequired
                | BookError::FilePathRequired
                | BookError::InvalidFormat
                | BookError::FileTooLarge { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BookError::NotFound(_) | BookError::BlobNotFound(_))
    }
}

impl From<ValidationError> for BookError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::TitleRequired => BookError::TitleRequired,
            ValidationError::TitleTooLong => BookError::TitleTooLong,
            ValidationError::AuthorTooLong => BookError::AuthorTooLong,
            ValidationError::FormatRequired => BookError::FormatRequired,
            ValidationError::FilePathRequired => BookError::FilePathRequired,
        }
    }
}
