//! Core error types.

use std::sync::Arc;
use thiserror::Error;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed executor failure, shared so errors stay cloneable.
pub type ExecutionSource = Arc<dyn std::error::Error + Send + Sync>;

/// Engine errors.
///
/// Everything except [`Error::Execution`] and [`Error::Conversion`] is a
/// configuration error and is raised when the query compiles, before any
/// statement reaches the executor.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A contain or lookup names an association the collection does not declare.
    #[error("collection '{collection}' has no association named '{association}'")]
    UnknownAssociation {
        collection: String,
        association: String,
    },

    /// The requested fetch strategy is unknown or unsupported for the association.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Two associations on one path, or two tables in one statement, share an alias.
    #[error("duplicate alias '{alias}' in contain path '{path}'")]
    DuplicateAlias { alias: String, path: String },

    /// An association with this name is already declared on the collection.
    #[error("collection '{collection}' already declares association '{association}'")]
    DuplicateAssociation {
        collection: String,
        association: String,
    },

    /// The registry cannot resolve a collection.
    #[error("collection '{0}' is not registered")]
    MissingCollection(String),

    /// A contain specification could not be normalized.
    #[error("invalid contain specification: {0}")]
    InvalidContain(String),

    /// A query option has an unusable value.
    #[error("invalid value for option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    /// The contain tree is deeper than the configured maximum.
    #[error("contain path '{path}' exceeds the maximum depth of {max_depth}")]
    ContainTooDeep { path: String, max_depth: usize },

    /// A raw value could not be converted to the declared column type.
    #[error("cannot convert {value} to {column_type}")]
    Conversion { column_type: String, value: String },

    /// The statement executor failed.
    #[error("execution failed: {0}")]
    Execution(#[source] ExecutionSource),
}

impl Error {
    /// Wrap an executor error without rewording it.
    pub fn execution<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Execution(Arc::new(error))
    }

    pub fn invalid_option(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error was raised by the statement executor.
    pub fn is_execution(&self) -> bool {
        matches!(self, Error::Execution(_))
    }
}
