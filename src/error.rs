use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::extractor::Extraction;

/// A single page fetch failure, as reported by a `PageSource`.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("unreadable body from {url}: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    /// Worth another attempt: timeouts, connection trouble, rate limits and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Body { .. } => false,
        }
    }
}

/// Traversal stopped at `page` after local retries ran out. Carries every record
/// collected before that page so downstream stages can still process them.
#[derive(Debug, Error)]
#[error("extraction stopped at page {page} after {attempts} attempt(s): {cause}")]
pub struct PartialExtractionError {
    pub page: u32,
    pub attempts: u32,
    pub cause: FetchError,
    pub extraction: Extraction,
}

/// Why a record failed schema rules in the cleaner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("rating is missing")]
    MissingRating,
    #[error("rating {0:?} is not an integer between 1 and 5")]
    InvalidRating(String),
    #[error("title is empty")]
    EmptyTitle,
    #[error("reviewer name is empty")]
    EmptyReviewerName,
    #[error("date is missing")]
    MissingDate,
    #[error("date {0:?} could not be parsed")]
    InvalidDate(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable at {path}: {message}")]
    Unavailable { path: String, message: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Error kinds reported to the scheduler in a run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    TransientFetchError,
    MalformedRecord,
    ValidationRejected,
    LoadRejected,
    StoreUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TransientFetchError => "TransientFetchError",
            ErrorKind::MalformedRecord => "MalformedRecord",
            ErrorKind::ValidationRejected => "ValidationRejected",
            ErrorKind::LoadRejected => "LoadRejected",
            ErrorKind::StoreUnavailable => "StoreUnavailable",
        };
        f.write_str(name)
    }
}
