use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use book_pavilion::blob_store::{
    BlobReader, BlobStore, BlobStoreError, BlobWriter, LocalBlobStore,
};
use book_pavilion::service::{
    BookError, BookService, BookUpload, ServiceLimits, Stage, EPUB_PLACEHOLDER, PDF_PLACEHOLDER,
};
use book_pavilion::storage::models::{BookFormat, BookRecord, NewBook};
use book_pavilion::storage::{BookStore, Database, DatabaseError};
use tokio::io::{AsyncRead, ReadBuf};

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    _dir: tempfile::TempDir,
    db: Database,
    upload_dir: std::path::PathBuf,
    service: BookService,
}

fn fixture_with_limits(limits: ServiceLimits) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let upload_dir = dir.path().join("uploads");
    let blobs = LocalBlobStore::new(&upload_dir).unwrap();
    let service = BookService::new(Arc::new(db.clone()), Arc::new(blobs), limits);
    Fixture {
        _dir: dir,
        db,
        upload_dir,
        service,
    }
}

fn fixture() -> Fixture {
    fixture_with_limits(ServiceLimits::default())
}

fn upload<'a>(title: &'a str, author: &'a str, filename: &'a str) -> BookUpload<'a> {
    BookUpload {
        title,
        author: Some(author),
        filename,
        declared_size: None,
    }
}

fn blob_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

async fn create(service: &BookService, title: &str, filename: &str, data: &[u8]) -> BookRecord {
    service
        .create_book(upload(title, "Jane", filename), data)
        .await
        .unwrap()
}

/// Yields `good` bytes, then fails as if the client disconnected.
struct BrokenReader {
    good: Vec<u8>,
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.good.is_empty() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "upload stream cut",
            )));
        }
        let n = self.good.len().min(buf.remaining());
        let chunk: Vec<u8> = self.good.drain(..n).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

/// A metadata store whose writes always fail.
struct FailingStore;

impl BookStore for FailingStore {
    fn insert_book(&self, _book: NewBook) -> Result<BookRecord, DatabaseError> {
        Err(DatabaseError::Io(io::Error::other("disk full")))
    }
    fn find_book(&self, _id: u64) -> Result<Option<BookRecord>, DatabaseError> {
        Ok(None)
    }
    fn find_book_with_deleted(&self, _id: u64) -> Result<Option<BookRecord>, DatabaseError> {
        Ok(None)
    }
    fn find_book_by_blob_name(&self, _name: &str) -> Result<Option<BookRecord>, DatabaseError> {
        Ok(None)
    }
    fn soft_delete_book(&self, _id: u64) -> Result<bool, DatabaseError> {
        Err(DatabaseError::Io(io::Error::other("disk full")))
    }
    fn count_books(&self) -> Result<u64, DatabaseError> {
        Err(DatabaseError::Io(io::Error::other("disk full")))
    }
    fn page_books(&self, _offset: u64, _limit: u64) -> Result<Vec<BookRecord>, DatabaseError> {
        Ok(Vec::new())
    }
}

/// Wraps a local store but refuses to remove anything.
struct UndeletableStore(LocalBlobStore);

#[async_trait]
impl BlobStore for UndeletableStore {
    async fn create(&self, name: &str) -> Result<BlobWriter, BlobStoreError> {
        self.0.create(name).await
    }
    async fn open(&self, name: &str) -> Result<BlobReader, BlobStoreError> {
        self.0.open(name).await
    }
    async fn remove(&self, _name: &str) -> Result<(), BlobStoreError> {
        Err(BlobStoreError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
    async fn exists(&self, name: &str) -> Result<bool, BlobStoreError> {
        self.0.exists(name).await
    }
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_book_for_every_format() {
    let f = fixture();

    for (filename, format) in [
        ("a.pdf", BookFormat::Pdf),
        ("b.EPUB", BookFormat::Epub),
        ("c.txt", BookFormat::Txt),
        ("d.Mobi", BookFormat::Mobi),
        (".txt", BookFormat::Txt),
    ] {
        let data = b"some book bytes";
        let book = create(&f.service, "Title", filename, data).await;
        assert_eq!(book.format, format);
        assert_eq!(book.byte_size, data.len() as u64);
        assert_eq!(book.original_filename, filename);
        assert!(book.blob_name.ends_with(&format!(".{format}")));
        assert!(f.upload_dir.join(&book.blob_name).is_file());
    }

    assert_eq!(blob_count(&f.upload_dir), 5);
}

#[tokio::test]
async fn test_create_then_get_round_trip() {
    let f = fixture();
    let created = create(&f.service, "My Book", "book.txt", b"abc").await;

    let fetched = f.service.get_book(created.id).unwrap();
    assert_eq!(fetched.title, "My Book");
    assert_eq!(fetched.author.as_deref(), Some("Jane"));
    assert_eq!(fetched.format, BookFormat::Txt);
    assert_eq!(fetched.byte_size, 3);
    assert_eq!(fetched, created);

    let on_disk = std::fs::read(f.upload_dir.join(&created.blob_name)).unwrap();
    assert_eq!(on_disk, b"abc");
}

#[tokio::test]
async fn test_create_empty_author_is_absent() {
    let f = fixture();
    let book = f
        .service
        .create_book(upload("Anonymous", "", "a.txt"), &b"x"[..])
        .await
        .unwrap();
    assert_eq!(book.author, None);
}

#[tokio::test]
async fn test_create_strips_client_directories() {
    let f = fixture();
    let book = create(&f.service, "Sneaky", "../../etc/passwd.txt", b"x").await;
    assert_eq!(book.original_filename, "passwd.txt");
    assert!(f.upload_dir.join(&book.blob_name).is_file());
}

#[tokio::test]
async fn test_same_filename_gets_distinct_blobs() {
    let f = fixture();
    let a = create(&f.service, "One", "book.txt", b"1").await;
    let b = create(&f.service, "Two", "book.txt", b"2").await;
    assert_ne!(a.blob_name, b.blob_name);
    assert_eq!(blob_count(&f.upload_dir), 2);
}

#[tokio::test]
async fn test_create_requires_title() {
    let f = fixture();

    for filename in ["book.txt", "book.doc", "noext"] {
        let result = f
            .service
            .create_book(upload("", "Jane", filename), &b"abc"[..])
            .await;
        assert!(matches!(result, Err(BookError::TitleRequired)));
    }
    let result = f
        .service
        .create_book(upload("   ", "Jane", "book.txt"), &b"abc"[..])
        .await;
    assert!(matches!(result, Err(BookError::TitleRequired)));

    assert_eq!(blob_count(&f.upload_dir), 0);
}

#[tokio::test]
async fn test_create_rejects_unknown_format() {
    let f = fixture();

    for filename in ["book.doc", "book", "book.", ""] {
        let result = f
            .service
            .create_book(upload("Title", "Jane", filename), &b"abc"[..])
            .await;
        assert!(
            matches!(result, Err(BookError::InvalidFormat)),
            "{filename:?} should be rejected"
        );
    }

    assert_eq!(blob_count(&f.upload_dir), 0);
    assert_eq!(f.db.count_books().unwrap(), 0);
}

#[tokio::test]
async fn test_create_rejects_overlong_fields() {
    let f = fixture();

    let title = "t".repeat(201);
    let result = f
        .service
        .create_book(upload(&title, "Jane", "a.txt"), &b"abc"[..])
        .await;
    assert!(matches!(result, Err(BookError::TitleTooLong)));

    let author = "a".repeat(101);
    let result = f
        .service
        .create_book(upload("Title", &author, "a.txt"), &b"abc"[..])
        .await;
    assert!(matches!(result, Err(BookError::AuthorTooLong)));

    assert_eq!(blob_count(&f.upload_dir), 0);
}

#[tokio::test]
async fn test_create_rejects_oversized_upload() {
    let f = fixture_with_limits(ServiceLimits {
        max_upload_size: 4,
        ..Default::default()
    });

    // Announced size over the limit: rejected before touching disk
    let announced = BookUpload {
        declared_size: Some(10),
        ..upload("Big", "Jane", "big.txt")
    };
    let result = f.service.create_book(announced, &b"0123456789"[..]).await;
    assert!(matches!(result, Err(BookError::FileTooLarge { limit: 4 })));

    // Unannounced: caught while copying, partial blob removed
    let result = f
        .service
        .create_book(upload("Big", "Jane", "big.txt"), &b"0123456789"[..])
        .await;
    assert!(matches!(result, Err(BookError::FileTooLarge { limit: 4 })));
    assert_eq!(blob_count(&f.upload_dir), 0);

    // Exactly at the limit is fine
    let book = create(&f.service, "Fits", "fits.txt", b"0123").await;
    assert_eq!(book.byte_size, 4);
}

#[tokio::test]
async fn test_create_removes_blob_when_stream_breaks() {
    let f = fixture();
    let reader = BrokenReader {
        good: b"partial content".to_vec(),
    };

    let result = f
        .service
        .create_book(upload("Broken", "Jane", "broken.txt"), reader)
        .await;
    assert!(matches!(
        result,
        Err(BookError::Io {
            stage: Stage::WriteBlob,
            ..
        })
    ));
    assert_eq!(blob_count(&f.upload_dir), 0);
    assert_eq!(f.db.count_books().unwrap(), 0);
}

#[tokio::test]
async fn test_create_removes_blob_when_persistence_fails() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");
    let service = BookService::new(
        Arc::new(FailingStore),
        Arc::new(LocalBlobStore::new(&upload_dir).unwrap()),
        ServiceLimits::default(),
    );

    let result = service
        .create_book(upload("Title", "Jane", "book.txt"), &b"abc"[..])
        .await;
    assert!(matches!(
        result,
        Err(BookError::Persistence {
            stage: Stage::InsertRecord,
            ..
        })
    ));
    assert_eq!(blob_count(&upload_dir), 0);
}

#[tokio::test]
async fn test_create_reports_failed_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");
    let service = BookService::new(
        Arc::new(FailingStore),
        Arc::new(UndeletableStore(LocalBlobStore::new(&upload_dir).unwrap())),
        ServiceLimits::default(),
    );

    let result = service
        .create_book(upload("Title", "Jane", "book.txt"), &b"abc"[..])
        .await;
    match result {
        Err(BookError::CleanupFailed {
            cause, blob_name, ..
        }) => {
            assert!(matches!(*cause, BookError::Persistence { .. }));
            assert!(upload_dir.join(blob_name).is_file());
        }
        other => panic!("expected CleanupFailed, got {other:?}"),
    }
}

// ============================================================================
// Get / List
// ============================================================================

#[tokio::test]
async fn test_get_book_not_found() {
    let f = fixture();
    assert!(matches!(f.service.get_book(1), Err(BookError::NotFound(1))));
}

#[tokio::test]
async fn test_list_books_pagination() {
    let f = fixture();
    for i in 0..15 {
        create(&f.service, &format!("Book {i}"), "b.pdf", b"%PDF").await;
    }

    let page = f.service.list_books(1, 10).unwrap();
    assert_eq!(page.books.len(), 10);
    assert_eq!(page.total, 15);
    assert_eq!(page.books[0].title, "Book 0");

    let page = f.service.list_books(2, 10).unwrap();
    assert_eq!(page.books.len(), 5);
    assert_eq!(page.total, 15);
    assert_eq!(page.books[0].title, "Book 10");

    let page = f.service.list_books(3, 10).unwrap();
    assert!(page.books.is_empty());
    assert_eq!(page.total, 15);
}

#[tokio::test]
async fn test_list_books_normalizes_arguments() {
    let f = fixture_with_limits(ServiceLimits {
        max_page_size: 5,
        ..Default::default()
    });
    for i in 0..8 {
        create(&f.service, &format!("Book {i}"), "b.txt", b"x").await;
    }

    let page = f.service.list_books(1, 1000).unwrap();
    assert_eq!(page.page_size, 5);
    assert_eq!(page.books.len(), 5);

    let page = f.service.list_books(0, 0).unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 1);
    assert_eq!(page.books.len(), 1);
}

#[tokio::test]
async fn test_list_books_store_failure() {
    let dir = tempfile::tempdir().unwrap();
    let service = BookService::new(
        Arc::new(FailingStore),
        Arc::new(LocalBlobStore::new(dir.path()).unwrap()),
        ServiceLimits::default(),
    );

    assert!(matches!(
        service.list_books(1, 10),
        Err(BookError::Persistence {
            stage: Stage::CountRecords,
            ..
        })
    ));
}

// ============================================================================
// Content
// ============================================================================

#[tokio::test]
async fn test_get_content_txt() {
    let f = fixture();
    let book = create(&f.service, "Hello", "hello.txt", b"hello").await;
    assert_eq!(f.service.get_content(book.id).await.unwrap(), "hello");
}

#[tokio::test]
async fn test_get_content_placeholders() {
    let f = fixture();
    let pdf = create(&f.service, "Pdf", "doc.pdf", b"%PDF-1.7 binary").await;
    let epub = create(&f.service, "Epub", "doc.epub", b"PK\x03\x04").await;

    assert_eq!(f.service.get_content(pdf.id).await.unwrap(), PDF_PLACEHOLDER);
    assert_eq!(f.service.get_content(epub.id).await.unwrap(), EPUB_PLACEHOLDER);
}

#[tokio::test]
async fn test_get_content_mobi_unsupported() {
    let f = fixture();
    let mobi = create(&f.service, "Mobi", "doc.mobi", b"BOOKMOBI").await;

    assert!(matches!(
        f.service.get_content(mobi.id).await,
        Err(BookError::UnsupportedFormat(BookFormat::Mobi))
    ));
}

#[tokio::test]
async fn test_get_content_missing_file() {
    let f = fixture();
    let book = create(&f.service, "Vanished", "v.txt", b"gone soon").await;
    std::fs::remove_file(f.upload_dir.join(&book.blob_name)).unwrap();

    assert!(matches!(
        f.service.get_content(book.id).await,
        Err(BookError::Io {
            stage: Stage::ReadBlob,
            ..
        })
    ));
}

#[tokio::test]
async fn test_get_content_not_found() {
    let f = fixture();
    assert!(matches!(
        f.service.get_content(5).await,
        Err(BookError::NotFound(5))
    ));
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_book() {
    let f = fixture();
    let book = create(&f.service, "Doomed", "doomed.txt", b"bye").await;

    f.service.delete_book(book.id).await.unwrap();

    assert!(matches!(
        f.service.get_book(book.id),
        Err(BookError::NotFound(_))
    ));
    assert!(!f.upload_dir.join(&book.blob_name).exists());

    let row = f.db.find_book_with_deleted(book.id).unwrap().unwrap();
    assert!(row.deleted_at.is_some());

    // Deleting again is a not-found
    assert!(matches!(
        f.service.delete_book(book.id).await,
        Err(BookError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_tolerates_missing_file() {
    let f = fixture();
    let book = create(&f.service, "Orphan", "orphan.txt", b"x").await;
    std::fs::remove_file(f.upload_dir.join(&book.blob_name)).unwrap();

    f.service.delete_book(book.id).await.unwrap();
    assert!(f.service.get_book(book.id).is_err());
}

#[tokio::test]
async fn test_delete_keeps_soft_delete_when_file_removal_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let upload_dir = dir.path().join("uploads");
    let service = BookService::new(
        Arc::new(db.clone()),
        Arc::new(UndeletableStore(LocalBlobStore::new(&upload_dir).unwrap())),
        ServiceLimits::default(),
    );

    let book = create(&service, "Stuck", "stuck.txt", b"x").await;
    let result = service.delete_book(book.id).await;
    assert!(matches!(
        result,
        Err(BookError::Io {
            stage: Stage::RemoveBlob,
            ..
        })
    ));

    // Record stays deleted, file stays on disk
    assert!(matches!(service.get_book(book.id), Err(BookError::NotFound(_))));
    assert!(upload_dir.join(&book.blob_name).is_file());
}

#[tokio::test]
async fn test_delete_not_found() {
    let f = fixture();
    assert!(matches!(
        f.service.delete_book(3).await,
        Err(BookError::NotFound(3))
    ));
}

#[tokio::test]
async fn test_end_to_end() {
    let f = fixture();

    let book = create(&f.service, "My Book", "book.txt", b"abc").await;
    assert_eq!(f.service.get_book(book.id).unwrap(), book);
    assert_eq!(f.service.get_content(book.id).await.unwrap(), "abc");
    f.service.delete_book(book.id).await.unwrap();
    assert!(matches!(
        f.service.get_book(book.id),
        Err(BookError::NotFound(_))
    ));
    assert_eq!(f.service.list_books(1, 10).unwrap().total, 0);
}

// ============================================================================
// Raw file access
// ============================================================================

#[tokio::test]
async fn test_open_blob() {
    use tokio::io::AsyncReadExt;

    let f = fixture();
    let book = create(&f.service, "Raw", "raw.pdf", b"%PDF raw").await;

    let (found, mut reader) = f.service.open_blob(&book.blob_name).await.unwrap();
    assert_eq!(found.id, book.id);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, b"%PDF raw");

    f.service.delete_book(book.id).await.unwrap();
    assert!(matches!(
        f.service.open_blob(&book.blob_name).await,
        Err(BookError::BlobNotFound(_))
    ));
}
