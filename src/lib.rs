//! book-pavilion - A minimal book library backend
//!
//! This crate provides book upload, listing, content reading and deletion with:
//! - Book files kept in a local upload directory under generated names
//! - Book metadata in a redb embedded database (ACID, MVCC, crash-safe)
//! - Soft delete: deleted records stay in the database, hidden from reads
//! - REST API with multipart upload support

pub mod api;
pub mod blob_store;
pub mod config;
pub mod service;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use config::Config;
use service::BookService;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub books: BookService,
}
