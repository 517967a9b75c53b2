use chrono::Utc;
use redb::{ReadableTable, ReadableTableMetadata};

use super::db::{Database, DatabaseError};
use super::models::{BookRecord, NewBook};
use super::tables::*;
use super::BookStore;

impl BookStore for Database {
    /// Assign the next id, store the record and update the blob name and active indexes
    fn insert_book(&self, book: NewBook) -> Result<BookRecord, DatabaseError> {
        let write_txn = self.begin_write()?;
        let record = {
            let mut blob_names = write_txn.open_table(BLOB_NAMES)?;
            if blob_names.get(book.blob_name.as_str())?.is_some() {
                return Err(DatabaseError::Conflict(format!(
                    "blob name '{}' is already in use",
                    book.blob_name
                )));
            }

            let id = Database::next_sequence(&write_txn, BOOK_ID_SEQUENCE)?;
            let record = book.into_record(id, Utc::now())?;

            let mut table = write_txn.open_table(BOOKS)?;
            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(id, data.as_slice())?;

            blob_names.insert(record.blob_name.as_str(), id)?;

            let mut active = write_txn.open_table(ACTIVE_BOOKS)?;
            active.insert(id, ())?;

            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    fn find_book(&self, id: u64) -> Result<Option<BookRecord>, DatabaseError> {
        Ok(self.find_book_with_deleted(id)?.filter(|b| !b.is_deleted()))
    }

    fn find_book_with_deleted(&self, id: u64) -> Result<Option<BookRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(BOOKS)?;

        match table.get(id)? {
            Some(data) => {
                let book: BookRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(book))
            }
            None => Ok(None),
        }
    }

    /// Resolve blob name -> id -> book, skipping soft-deleted books
    fn find_book_by_blob_name(
        &self,
        blob_name: &str,
    ) -> Result<Option<BookRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let blob_names = read_txn.open_table(BLOB_NAMES)?;

        let id = match blob_names.get(blob_name)? {
            Some(data) => data.value(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(BOOKS)?;
        match table.get(id)? {
            Some(data) => {
                let book: BookRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(book).filter(|b| !b.is_deleted()))
            }
            None => Ok(None),
        }
    }

    /// Mark a book deleted and drop it from the active index. The row and its
    /// blob name index entry are kept so the name is never handed out again.
    fn soft_delete_book(&self, id: u64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let existing: Option<BookRecord> = {
            let table = write_txn.open_table(BOOKS)?;
            let result = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            result
        };

        let deleted = match existing {
            Some(mut book) if !book.is_deleted() => {
                let now = Utc::now();
                book.deleted_at = Some(now);
                book.updated_at = now;

                let data = rmp_serde::to_vec_named(&book)?;
                {
                    let mut table = write_txn.open_table(BOOKS)?;
                    table.insert(id, data.as_slice())?;
                }
                {
                    let mut active = write_txn.open_table(ACTIVE_BOOKS)?;
                    active.remove(id)?;
                }
                true
            }
            _ => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    fn count_books(&self) -> Result<u64, DatabaseError> {
        let read_txn = self.begin_read()?;
        let active = read_txn.open_table(ACTIVE_BOOKS)?;
        Ok(active.len()?)
    }

    fn page_books(&self, offset: u64, limit: u64) -> Result<Vec<BookRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let active = read_txn.open_table(ACTIVE_BOOKS)?;
        let table = read_txn.open_table(BOOKS)?;

        let ids: Vec<u64> = active
            .iter()?
            .skip(offset as usize)
            .take(limit as usize)
            .map(|r| r.map(|(k, _)| k.value()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut books = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = table.get(id)? {
                let book: BookRecord = rmp_serde::from_slice(data.value())?;
                books.push(book);
            }
        }

        Ok(books)
    }
}
