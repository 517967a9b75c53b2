//! The book record service: ties upload validation, blob placement and
//! metadata persistence together, and undoes partial work on failure.

mod error;

pub use error::{BookError, Stage};

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::blob_store::{BlobReader, BlobStore, BlobStoreError, BlobWriter};
use crate::storage::models::{BookFormat, BookRecord, NewBook};
use crate::storage::BookStore;

/// Returned by `get_content` for PDF books; text extraction is not implemented.
pub const PDF_PLACEHOLDER: &str = "PDF content loading not implemented";
/// Returned by `get_content` for EPUB books; text extraction is not implemented.
pub const EPUB_PLACEHOLDER: &str = "EPUB content loading not implemented";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    /// Maximum number of bytes accepted for a single upload
    pub max_upload_size: u64,
    /// Upper bound applied to the requested page size
    pub max_page_size: u32,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024,
            max_page_size: 100,
        }
    }
}

/// An incoming upload. The content bytes are passed separately as a reader.
#[derive(Debug, Clone, Copy)]
pub struct BookUpload<'a> {
    pub title: &'a str,
    pub author: Option<&'a str>,
    pub filename: &'a str,
    /// Size announced by the client, if any. Only used to reject oversized
    /// uploads early; the stored size is what was actually copied.
    pub declared_size: Option<u64>,
}

/// One page of active books plus the total across all pages.
#[derive(Debug, Clone)]
pub struct BookPage {
    pub books: Vec<BookRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Clone)]
pub struct BookService {
    store: Arc<dyn BookStore>,
    blobs: Arc<dyn BlobStore>,
    limits: ServiceLimits,
}

impl BookService {
    pub fn new(store: Arc<dyn BookStore>, blobs: Arc<dyn BlobStore>, limits: ServiceLimits) -> Self {
        Self {
            store,
            blobs,
            limits,
        }
    }

    pub fn limits(&self) -> ServiceLimits {
        self.limits
    }

    /// Validate an upload, copy its bytes into the blob store and persist the
    /// record. On any failure after the blob was created, the blob is removed.
    pub async fn create_book<R>(
        &self,
        upload: BookUpload<'_>,
        mut reader: R,
    ) -> Result<BookRecord, BookError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if upload.title.trim().is_empty() {
            return Err(BookError::TitleRequired);
        }

        let original_filename = base_name(upload.filename);
        let format = BookFormat::from_filename(original_filename).ok_or(BookError::InvalidFormat)?;

        let limit = self.limits.max_upload_size;
        if upload.declared_size.is_some_and(|size| size > limit) {
            return Err(BookError::FileTooLarge { limit });
        }

        let mut book = NewBook {
            title: upload.title.to_string(),
            author: upload
                .author
                .filter(|a| !a.trim().is_empty())
                .map(|a| a.to_string()),
            format: Some(format),
            blob_name: generate_blob_name(format),
            original_filename: original_filename.to_string(),
            byte_size: 0,
        };
        book.validate()?;

        // Phase 1: open the destination blob
        let blob_name = book.blob_name.clone();
        let mut writer = self
            .blobs
            .create(&blob_name)
            .await
            .map_err(BookError::io(Stage::CreateBlob))?;

        // Phase 2: stream the upload into it
        let copied = self.copy_upload(&mut reader, &mut writer).await;
        drop(writer);
        book.byte_size = match copied {
            Ok(n) => n,
            Err(e) => return Err(self.discard_blob(&blob_name, e).await),
        };

        // Phase 3: persist metadata
        let record = match self.store.insert_book(book) {
            Ok(record) => record,
            Err(e) => {
                let cause = BookError::persistence(Stage::InsertRecord)(e);
                return Err(self.discard_blob(&blob_name, cause).await);
            }
        };

        tracing::debug!(book_id = record.id, blob_name = %record.blob_name, "Created book");
        Ok(record)
    }

    pub fn get_book(&self, id: u64) -> Result<BookRecord, BookError> {
        self.store
            .find_book(id)
            .map_err(BookError::persistence(Stage::FindRecord))?
            .ok_or(BookError::NotFound(id))
    }

    /// List active books. `page` is 1-based; `page_size` is clamped to
    /// `1..=max_page_size`.
    pub fn list_books(&self, page: u32, page_size: u32) -> Result<BookPage, BookError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, self.limits.max_page_size.max(1));
        let offset = u64::from(page - 1) * u64::from(page_size);

        // Count and page run in separate transactions; the total may be
        // slightly stale relative to the page.
        let total = self
            .store
            .count_books()
            .map_err(BookError::persistence(Stage::CountRecords))?;
        let books = self
            .store
            .page_books(offset, u64::from(page_size))
            .map_err(BookError::persistence(Stage::PageRecords))?;

        Ok(BookPage {
            books,
            total,
            page,
            page_size,
        })
    }

    /// Readable content of a book. Only plain-text books are read from disk.
    pub async fn get_content(&self, id: u64) -> Result<String, BookError> {
        let book = self.get_book(id)?;

        match book.format {
            BookFormat::Txt => {
                let mut reader = self
                    .blobs
                    .open(&book.blob_name)
                    .await
                    .map_err(BookError::io(Stage::ReadBlob))?;
                let mut buf = Vec::with_capacity(book.byte_size as usize);
                reader
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| BookError::io(Stage::ReadBlob)(e.into()))?;
                Ok(String::from_utf8_lossy(&buf).into_owned())
            }
            BookFormat::Pdf => Ok(PDF_PLACEHOLDER.to_string()),
            BookFormat::Epub => Ok(EPUB_PLACEHOLDER.to_string()),
            other => Err(BookError::UnsupportedFormat(other)),
        }
    }

    /// Soft-delete the record, then remove its blob.
    ///
    /// The soft delete is not rolled back when removing the blob fails; the
    /// book stays deleted and the error is reported.
    pub async fn delete_book(&self, id: u64) -> Result<(), BookError> {
        let book = self.get_book(id)?;

        let deleted = self
            .store
            .soft_delete_book(id)
            .map_err(BookError::persistence(Stage::SoftDeleteRecord))?;
        if !deleted {
            // Deleted concurrently between the lookup and the soft delete
            return Err(BookError::NotFound(id));
        }

        match self.blobs.remove(&book.blob_name).await {
            Ok(()) | Err(BlobStoreError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(book_id = id, blob_name = %book.blob_name, error = %e, "Book deleted but its file could not be removed");
                return Err(BookError::io(Stage::RemoveBlob)(e));
            }
        }

        tracing::debug!(book_id = id, "Deleted book");
        Ok(())
    }

    /// Open the raw bytes of an active book by its blob name.
    pub async fn open_blob(&self, blob_name: &str) -> Result<(BookRecord, BlobReader), BookError> {
        let book = self
            .store
            .find_book_by_blob_name(blob_name)
            .map_err(BookError::persistence(Stage::FindRecord))?
            .ok_or_else(|| BookError::BlobNotFound(blob_name.to_string()))?;

        let reader = match self.blobs.open(&book.blob_name).await {
            Ok(reader) => reader,
            Err(BlobStoreError::NotFound(name)) => return Err(BookError::BlobNotFound(name)),
            Err(e) => return Err(BookError::io(Stage::ReadBlob)(e)),
        };
        Ok((book, reader))
    }

    /// Copy at most `max_upload_size` bytes and flush the writer.
    async fn copy_upload<R>(&self, reader: &mut R, writer: &mut BlobWriter) -> Result<u64, BookError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let limit = self.limits.max_upload_size;
        let mut limited = reader.take(limit.saturating_add(1));

        let copied = tokio::io::copy(&mut limited, writer)
            .await
            .map_err(|e| BookError::io(Stage::WriteBlob)(e.into()))?;
        if copied > limit {
            return Err(BookError::FileTooLarge { limit });
        }

        writer
            .shutdown()
            .await
            .map_err(|e| BookError::io(Stage::WriteBlob)(e.into()))?;
        Ok(copied)
    }

    /// Best-effort removal of a blob left behind by a failed create. A failed
    /// removal is folded into the returned error.
    async fn discard_blob(&self, blob_name: &str, cause: BookError) -> BookError {
        match self.blobs.remove(blob_name).await {
            Ok(()) => {
                tracing::warn!(blob_name, error = %cause, "Removed book file after failed upload");
                cause
            }
            Err(cleanup) => {
                tracing::error!(blob_name, error = %cause, cleanup_error = %cleanup, "Failed to remove book file after failed upload");
                BookError::CleanupFailed {
                    cause: Box::new(cause),
                    blob_name: blob_name.to_string(),
                    cleanup,
                }
            }
        }
    }
}

/// Strip any client-supplied directory components from an upload filename.
fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

/// `{unix_nanos}_{uuid}.{ext}`. The random part makes names unique even for
/// uploads landing in the same nanosecond.
fn generate_blob_name(format: BookFormat) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{nanos}_{}.{format}", uuid::Uuid::new_v4().simple())
}
