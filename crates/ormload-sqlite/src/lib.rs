//! SQLite backend for ormload.
//!
//! [`SqliteExecutor`] runs compiled statements on a `rusqlite` connection
//! and describes tables for sessions that build collections without
//! declared columns.

mod error;
mod executor;

pub use error::{Result, SqliteError};
pub use executor::SqliteExecutor;
