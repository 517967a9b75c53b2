//! Shared test helpers for in-crate router tests.

use std::sync::Arc;

use crate::blob_store::LocalBlobStore;
use crate::config::{Config, LibraryConfig, ServerConfig, StorageConfig};
use crate::service::BookService;
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and upload directory.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let upload_dir = temp_dir.path().join("uploads");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
        },
        storage: StorageConfig {
            data_dir: data_dir.to_string_lossy().to_string(),
            upload_dir: upload_dir.to_string_lossy().to_string(),
        },
        library: LibraryConfig {
            max_upload_size: 1024 * 1024, // 1MB for tests
            ..Default::default()
        },
        test_mode: true,
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let blobs = LocalBlobStore::new(&upload_dir).expect("Failed to create test upload dir");
    let books = BookService::new(
        Arc::new(db.clone()),
        Arc::new(blobs),
        config.library.service_limits(),
    );

    Arc::new(AppState { config, db, books })
}
