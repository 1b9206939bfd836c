//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// The store is temporarily unable to serve the request (busy or
    /// locked database, exhausted pool). Safe to retry.
    #[error("store busy: {0}")]
    Busy(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The tables of a kind have not been created.
    #[error("missing table: {0}")]
    MissingTable(String),

    /// Stored data does not have the expected shape.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The store is closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Whether the failed operation may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Busy(_))
    }

    /// Whether this error is a uniqueness violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        // SQLITE_BUSY = 5, SQLITE_LOCKED = 6; extended codes keep the
        // primary code in the low byte
        const BUSY: i32 = 5;
        const LOCKED: i32 = 6;

        let classified = match &err {
            sqlx::Error::PoolTimedOut => Some(StorageError::Busy(err.to_string())),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Some(StorageError::Conflict(db.message().to_string()))
            }
            sqlx::Error::Database(db) => {
                let primary = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                match primary {
                    Some(BUSY | LOCKED) => Some(StorageError::Busy(db.message().to_string())),
                    _ => db
                        .message()
                        .strip_prefix("no such table: ")
                        .map(|table| StorageError::MissingTable(table.to_string())),
                }
            }
            _ => None,
        };
        match classified {
            Some(classified) => classified,
            None => StorageError::Database(err),
        }
    }
}
