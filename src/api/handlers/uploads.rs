use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::api::response::{ApiError, AppPath};
use crate::AppState;

/// Stream an uploaded book file by its blob name.
/// Route: GET /uploads/*blob_name
pub async fn serve_upload(
    State(state): State<Arc<AppState>>,
    AppPath(blob_name): AppPath<String>,
) -> Result<Response, ApiError> {
    let (book, reader) = state.books.open_blob(&blob_name).await?;

    let body = Body::from_stream(ReaderStream::new(reader));
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();

    let mime_type = mime_guess::from_path(&book.blob_name).first_or_octet_stream();
    headers.insert(
        header::CONTENT_TYPE,
        mime_type
            .as_ref()
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(book.byte_size),
    );

    // Offer the name the book was uploaded under
    if let Ok(value) = format!("inline; filename=\"{}\"", book.original_filename.replace('"', "")).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    // Book files never change once uploaded
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("public, max-age=3600"),
    );

    Ok(response)
}
