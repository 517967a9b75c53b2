mod admin;
mod books;
mod uploads;

pub use admin::{admin_purge, health};
pub use books::{create_book, delete_book, get_book, get_book_content, list_books};
pub use uploads::serve_upload;
