use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Multipart framing and the text fields ride on top of the file bytes.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = (state.config.library.max_upload_size as usize)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        // Books
        .route("/api/books", get(handlers::list_books))
        .route(
            "/api/books",
            post(handlers::create_book).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/books/:id", get(handlers::get_book))
        .route("/api/books/:id", delete(handlers::delete_book))
        .route("/api/books/:id/content", get(handlers::get_book_content))
        // Raw uploaded files
        .route("/uploads/*blob_name", get(handlers::serve_upload))
        // Internal
        .route("/api/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
