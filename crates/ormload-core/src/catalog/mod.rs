//! Collection catalog.
//!
//! The catalog holds the collections a session knows about, their declared
//! columns and the association graph between them.

mod association;
mod collection;
mod column;
pub mod inflector;
mod registry;

pub use association::{
    Association, AssociationGraph, AssociationKind, AssociationOptions, Strategy,
};
pub use collection::{Collection, CollectionConfig};
pub use column::ColumnDef;
pub use registry::Registry;
