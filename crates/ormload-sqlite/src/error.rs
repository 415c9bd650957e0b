//! SQLite executor errors.

use thiserror::Error;

/// Result alias for SQLite executor operations.
pub type Result<T> = std::result::Result<T, SqliteError>;

/// Errors raised by the SQLite executor.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// The driver rejected a statement or failed to read a row.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl From<SqliteError> for ormload_core::Error {
    fn from(error: SqliteError) -> Self {
        ormload_core::Error::execution(error)
    }
}
