use redb::TableDefinition;

/// Book records: id -> BookRecord (msgpack), including soft-deleted rows
pub const BOOKS: TableDefinition<u64, &[u8]> = TableDefinition::new("books");

/// Active set: ids of books that are not soft-deleted, in insertion order
pub const ACTIVE_BOOKS: TableDefinition<u64, ()> = TableDefinition::new("active_books");

/// Blob name index: blob_name -> id (for /uploads/ route lookups)
pub const BLOB_NAMES: TableDefinition<&str, u64> = TableDefinition::new("blob_names");

/// Monotonic counters: sequence name -> last allocated value
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub(crate) const BOOK_ID_SEQUENCE: &str = "book_id";
