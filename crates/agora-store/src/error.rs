use agora_shared::FeedError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    /// The acting member lacks the role or ownership the write requires.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request itself is unacceptable (empty content, reserved name...).
    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for FeedError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Forbidden(reason) => FeedError::Forbidden(reason),
            other => FeedError::TransientFetchFailure(other.to_string()),
        }
    }
}
