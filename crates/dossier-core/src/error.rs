//! Typed failure modes of the archive engine.
//!
//! None of these abort a process. Query-level errors end a single request,
//! metadata errors are attached to the result row they concern, and scan
//! errors are either fatal to one scan ([`ScanError`]) or collected as
//! [`ScanWarning`](crate::models::ScanWarning)s.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors that end a search request before any file is considered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Neither a name nor an id was supplied.
    #[error("invalid query: a name or an id is required")]
    InvalidQuery,
}

/// Per-file metadata failures. Reported alongside the file, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataError {
    #[error("spreadsheet not found: {expected} (in {})", .catalog_dir.display())]
    SpreadsheetNotFound {
        expected: String,
        catalog_dir: PathBuf,
    },

    #[error("no sheet for classification code {code}")]
    SheetNotRecognized { code: String },

    #[error("no row for {code} in sheet {sheet}")]
    RowNotFound { code: String, sheet: String },

    /// The spreadsheet exists but could not be decoded.
    #[error("cannot read {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },
}

impl MetadataError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MetadataError::SpreadsheetNotFound { .. } => "spreadsheet_not_found",
            MetadataError::SheetNotRecognized { .. } => "sheet_not_recognized",
            MetadataError::RowNotFound { .. } => "row_not_found",
            MetadataError::Unreadable { .. } => "unreadable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxonomyError {
    #[error("category not found: {0}")]
    CategoryNotFound(String),
}

/// Errors that abandon a whole scan. Nothing from the scan is published.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("import root does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("cannot list {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("scan cancelled")]
    Cancelled,

    #[error("scan worker failed: {0}")]
    Worker(String),
}
