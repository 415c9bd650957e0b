//! CLI error type.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {what}: {source}")]
    Json {
        what: String,
        source: serde_json::Error,
    },

    #[error("schema: {0}")]
    Schema(String),

    #[error(transparent)]
    Engine(#[from] ormload_core::Error),

    #[error(transparent)]
    Sqlite(#[from] ormload_sqlite::SqliteError),
}

impl CliError {
    pub fn json(what: impl Into<String>, source: serde_json::Error) -> Self {
        CliError::Json {
            what: what.into(),
            source,
        }
    }
}
