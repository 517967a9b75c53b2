use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::Json;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppPath, AppQuery, JSend, JSendPaginated, Pagination};
use crate::service::BookUpload;
use crate::storage::models::{BookFormat, BookRecord};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub author: Option<String>,
    pub blob_name: String,
    pub byte_size: u64,
    pub created_at: String,
    pub format: BookFormat,
    pub id: u64,
    pub original_filename: String,
    pub title: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ListBooksParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: Option<u32>,
}

fn default_page() -> u32 {
    1
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_book(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<BookResponse>>), ApiError> {
    let max_upload_size = state.config.library.max_upload_size;
    let mut file_data: Option<BytesMut> = None;
    let mut file_name: Option<String> = None;
    let mut title: Option<String> = None;
    let mut author: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = Some(field.file_name().unwrap_or("").to_string());

                let mut buf = BytesMut::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?
                {
                    if (buf.len() + chunk.len()) as u64 > max_upload_size {
                        return Err(ApiError::payload_too_large(format!(
                            "File exceeds maximum upload size of {max_upload_size} bytes"
                        )));
                    }
                    buf.extend_from_slice(&chunk);
                }
                file_data = Some(buf);
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid title: {e}")))?,
                );
            }
            "author" => {
                author = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid author: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    let file_name = file_name.unwrap_or_default();
    let title = title.unwrap_or_default();

    let upload = BookUpload {
        title: &title,
        author: author.as_deref(),
        filename: &file_name,
        declared_size: Some(file_data.len() as u64),
    };
    let book = state.books.create_book(upload, &file_data[..]).await?;

    Ok((StatusCode::CREATED, JSend::success(book_to_response(&book))))
}

pub async fn get_book(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<u64>,
) -> Result<Json<JSend<BookResponse>>, ApiError> {
    let book = state.books.get_book(id)?;
    Ok(JSend::success(book_to_response(&book)))
}

pub async fn get_book_content(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<u64>,
) -> Result<([(header::HeaderName, &'static str); 1], String), ApiError> {
    let content = state.books.get_content(id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    ))
}

pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<u64>,
) -> Result<StatusCode, ApiError> {
    state.books.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_books(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListBooksParams>,
) -> Result<Json<JSendPaginated<BookResponse>>, ApiError> {
    if params.page == 0 {
        return Err(ApiError::bad_request("page must be greater than 0"));
    }
    let page_size = params
        .page_size
        .unwrap_or(state.config.library.default_page_size);
    if page_size == 0 {
        return Err(ApiError::bad_request("page_size must be greater than 0"));
    }

    let page = state.books.list_books(params.page, page_size)?;
    let items = page.books.iter().map(book_to_response).collect();

    Ok(JSendPaginated::success(
        items,
        Pagination {
            page: page.page,
            page_size: page.page_size,
            total: page.total,
        },
    ))
}

// ============================================================================
// Helpers
// ============================================================================

fn book_to_response(book: &BookRecord) -> BookResponse {
    BookResponse {
        author: book.author.clone(),
        blob_name: book.blob_name.clone(),
        byte_size: book.byte_size,
        created_at: book.created_at.to_rfc3339(),
        format: book.format,
        id: book.id,
        original_filename: book.original_filename.clone(),
        title: book.title.clone(),
        updated_at: book.updated_at.to_rfc3339(),
    }
}
