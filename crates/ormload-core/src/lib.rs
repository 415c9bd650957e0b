//! ormload core - association graph, query builder and eager loading.
//!
//! A [`Session`] owns a [`Registry`] of collections and a
//! [`StatementExecutor`]. Queries built from the session describe a root
//! collection and the associations to load with it; executing a query
//! plans the statements, runs them and returns hydrated nested records.

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod query;
pub mod session;
pub mod types;

pub use catalog::{
    Association, AssociationKind, AssociationOptions, Collection, CollectionConfig, ColumnDef,
    Registry, Strategy,
};
pub use config::{EngineConfig, PlaceholderStyle};
pub use error::{Error, Result};
pub use executor::{NullExecutor, RowCursor, StatementExecutor};
pub use query::{
    Clause, ContainNode, ContainTree, Emitter, Fields, MapReduceStage, Query, ResultSet,
};
pub use session::Session;
pub use types::{BasicTypeConverter, ScalarType, TypeConverter, TypeMap};

/// Re-export shared data types.
pub use ormload_proto as proto;
