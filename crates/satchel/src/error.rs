//! Error types for the satchel crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Uses `thiserror` for ergonomic, zero-cost error definitions.
//!
//! Note that "no rows affected" is *not* an error anywhere in this crate:
//! `update` and `delete` return affected-row counts and `find_by_id`
//! returns an `Option`. Zero is a normal outcome callers must check.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the data access layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened: unreachable path,
    /// unwritable directory, or a file the engine cannot read.
    #[error("connection error: {0}")]
    Connection(String),

    /// A schema migration failed or a downgrade was attempted.
    #[error("migration to v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// A unique, foreign-key, or not-null constraint was violated on write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A stored value could not be reconstructed into its declared field type.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<rusqlite::Error> for StoreError {
    /// Route engine errors to their dedicated variants at one choke point,
    /// so every call site gets the same classification for free via `?`.
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, ref message)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let detail = message.clone().unwrap_or_else(|| e.to_string());
                Self::Constraint(detail)
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => {
                Self::Serialization(err.to_string())
            }
            other => Self::Sqlite(other),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

// ── tests ────────────────────────────────────────────────────────────
