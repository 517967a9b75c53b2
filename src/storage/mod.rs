pub mod db;
mod books;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError, PurgeStats};
pub use tables::*;

use models::{BookRecord, NewBook};

/// Metadata store consumed by the book service.
///
/// Every read except `find_book_with_deleted` only sees books that have not
/// been soft-deleted. Ordering is insertion order.
pub trait BookStore: Send + Sync {
    fn insert_book(&self, book: NewBook) -> Result<BookRecord, DatabaseError>;
    fn find_book(&self, id: u64) -> Result<Option<BookRecord>, DatabaseError>;
    fn find_book_with_deleted(&self, id: u64) -> Result<Option<BookRecord>, DatabaseError>;
    fn find_book_by_blob_name(&self, blob_name: &str)
        -> Result<Option<BookRecord>, DatabaseError>;
    /// Returns `false` when the book does not exist or is already deleted.
    fn soft_delete_book(&self, id: u64) -> Result<bool, DatabaseError>;
    fn count_books(&self) -> Result<u64, DatabaseError>;
    fn page_books(&self, offset: u64, limit: u64) -> Result<Vec<BookRecord>, DatabaseError>;
}
