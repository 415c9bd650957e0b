//! Collection descriptors.

use super::association::{Association, AssociationGraph, AssociationKind, AssociationOptions};
use super::column::ColumnDef;
use super::inflector;
use crate::config::DEFAULT_PRIMARY_KEY;
use crate::error::Result;
use crate::types::ScalarType;
use parking_lot::RwLock;

/// Optional settings for building a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionConfig {
    /// Physical table; defaults to the tableized alias.
    pub table: Option<String>,
    /// Primary key column; defaults to `id`.
    pub primary_key: Option<String>,
    /// Declared columns, in select order.
    pub columns: Vec<ColumnDef>,
    /// Name of the connection the collection lives on.
    pub connection: Option<String>,
}

impl CollectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Fill every unset setting from `fallback`.
    pub fn or(mut self, fallback: &CollectionConfig) -> Self {
        if self.table.is_none() {
            self.table = fallback.table.clone();
        }
        if self.primary_key.is_none() {
            self.primary_key = fallback.primary_key.clone();
        }
        if self.columns.is_empty() {
            self.columns = fallback.columns.clone();
        }
        if self.connection.is_none() {
            self.connection = fallback.connection.clone();
        }
        self
    }
}

/// A registered collection: table metadata plus its association graph.
///
/// Associations are declared through `&self` so a collection can be shared
/// as `Arc<Collection>`; the graph is only read while queries compile.
#[derive(Debug)]
pub struct Collection {
    alias: String,
    table: String,
    primary_key: String,
    columns: Vec<ColumnDef>,
    connection: Option<String>,
    associations: RwLock<AssociationGraph>,
}

impl Collection {
    pub fn new(alias: impl Into<String>, config: CollectionConfig) -> Self {
        let alias = alias.into();
        Self {
            table: config.table.unwrap_or_else(|| inflector::tableize(&alias)),
            primary_key: config
                .primary_key
                .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string()),
            columns: config.columns,
            connection: config.connection,
            associations: RwLock::new(AssociationGraph::new()),
            alias,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ScalarType> {
        self.column(name).and_then(|c| c.column_type)
    }

    /// Declare a many-to-one association.
    pub fn belongs_to(&self, name: &str, options: AssociationOptions) -> Result<Association> {
        self.associate(name, AssociationKind::BelongsTo, options)
    }

    /// Declare a one-to-one association owned by the target.
    pub fn has_one(&self, name: &str, options: AssociationOptions) -> Result<Association> {
        self.associate(name, AssociationKind::HasOne, options)
    }

    /// Declare a one-to-many association.
    pub fn has_many(&self, name: &str, options: AssociationOptions) -> Result<Association> {
        self.associate(name, AssociationKind::HasMany, options)
    }

    /// Declare a many-to-many association through a junction collection.
    pub fn belongs_to_many(
        &self,
        name: &str,
        options: AssociationOptions,
    ) -> Result<Association> {
        self.associate(name, AssociationKind::BelongsToMany, options)
    }

    fn associate(
        &self,
        name: &str,
        kind: AssociationKind,
        options: AssociationOptions,
    ) -> Result<Association> {
        let association = Association::new(&self.alias, name, kind, options)?;
        self.add_association(association.clone())?;
        tracing::debug!(
            collection = %self.alias,
            association = %association.name,
            kind = %kind,
            target = %association.target,
            "declared association"
        );
        Ok(association)
    }

    /// Add a fully specified association.
    pub fn add_association(&self, association: Association) -> Result<()> {
        self.associations.write().add(association)
    }

    /// Look up an association by name.
    pub fn association(&self, name: &str) -> Option<Association> {
        self.associations.read().get(name).cloned()
    }

    /// All associations, in declaration order.
    pub fn associations(&self) -> Vec<Association> {
        self.associations.read().iter().cloned().collect()
    }
}
