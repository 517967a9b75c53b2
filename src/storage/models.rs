use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum author length in characters
pub const MAX_AUTHOR_LEN: usize = 100;

/// The closed set of book formats accepted on upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Epub,
    Mobi,
    Pdf,
    Txt,
}

impl BookFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Mobi => "mobi",
            BookFormat::Pdf => "pdf",
            BookFormat::Txt => "txt",
        }
    }

    /// Derive the format from the text after the last `.` of the base name
    /// (case-insensitive), so `.txt` on its own is a txt file.
    /// Returns `None` when there is no extension or it is not a known format.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        base.rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .and_then(|ext| ext.parse().ok())
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown book format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for BookFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epub" => Ok(BookFormat::Epub),
            "mobi" => Ok(BookFormat::Mobi),
            "pdf" => Ok(BookFormat::Pdf),
            "txt" => Ok(BookFormat::Txt),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Field-level validation failures for a record about to be persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("book title is required")]
    TitleRequired,
    #[error("book title exceeds {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    #[error("book author exceeds {MAX_AUTHOR_LEN} characters")]
    AuthorTooLong,
    #[error("book format is required")]
    FormatRequired,
    #[error("book file path is required")]
    FilePathRequired,
}

/// A book record stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    pub format: BookFormat,
    pub blob_name: String,
    pub original_filename: String,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl BookRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A record that has not been persisted yet; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: Option<String>,
    pub format: Option<BookFormat>,
    pub blob_name: String,
    pub original_filename: String,
    pub byte_size: u64,
}

impl NewBook {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::TitleRequired);
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }
        if self
            .author
            .as_deref()
            .is_some_and(|a| a.chars().count() > MAX_AUTHOR_LEN)
        {
            return Err(ValidationError::AuthorTooLong);
        }
        if self.format.is_none() {
            return Err(ValidationError::FormatRequired);
        }
        if self.blob_name.is_empty() {
            return Err(ValidationError::FilePathRequired);
        }
        Ok(())
    }

    /// Validate and materialize into a stored record.
    pub(crate) fn into_record(
        self,
        id: u64,
        now: DateTime<Utc>,
    ) -> Result<BookRecord, ValidationError> {
        self.validate()?;
        Ok(BookRecord {
            id,
            title: self.title,
            author: self.author,
            format: self.format.ok_or(ValidationError::FormatRequired)?,
            blob_name: self.blob_name,
            original_filename: self.original_filename,
            byte_size: self.byte_size,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}
