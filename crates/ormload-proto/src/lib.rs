//! ormload shared types.
//!
//! This crate defines the plain data types exchanged between the query
//! engine, statement executors and callers.
//!
//! # Modules
//!
//! - [`value`] - Runtime scalar values for parameters and rows
//! - [`condition`] - Filter conditions and ordering
//! - [`statement`] - SELECT statement IR and compiled SQL
//! - [`record`] - Flat result rows and hydrated nested records

pub mod condition;
pub mod record;
pub mod statement;
pub mod value;

// Re-export commonly used types at crate root
pub use condition::{Condition, OrderDirection, OrderSpec};
pub use record::{Datum, Record, Row};
pub use statement::{
    result_key, CompiledStatement, JoinClause, JoinKind, SelectItem, SelectStatement, TableRef,
    KEY_SEPARATOR,
};
pub use value::{GroupKey, Value};
