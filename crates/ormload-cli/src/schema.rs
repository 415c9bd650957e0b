//! Schema files.
//!
//! A schema file declares collections and their associations so the CLI
//! can build a session without Rust code:
//!
//! ```json
//! {"collections": {"author": {
//!     "table": "authors",
//!     "primary_key": "id",
//!     "columns": {"id": "integer", "name": "string"},
//!     "associations": [{"kind": "has_many", "name": "article"}]
//! }}}
//! ```

use crate::error::{CliError, Result};
use indexmap::IndexMap;
use ormload_core::catalog::{AssociationOptions, CollectionConfig, ColumnDef};
use ormload_core::query::options::{parse_conditions, parse_order};
use ormload_core::{AssociationKind, Session, Strategy, TypeMap};
use serde::Deserialize;
use serde_json::Value as Json;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    #[serde(default)]
    pub collections: IndexMap<String, CollectionSchema>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionSchema {
    pub table: Option<String>,
    pub primary_key: Option<String>,
    /// Column name to type name; an empty map describes the table instead.
    #[serde(default)]
    pub columns: IndexMap<String, String>,
    #[serde(default)]
    pub associations: Vec<AssociationSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssociationSchema {
    pub kind: String,
    pub name: String,
    pub target: Option<String>,
    pub foreign_key: Option<String>,
    pub target_foreign_key: Option<String>,
    pub property: Option<String>,
    pub strategy: Option<String>,
    pub through: Option<String>,
    #[serde(default)]
    pub conditions: Option<Json>,
    #[serde(default)]
    pub sort: Option<Json>,
}

impl SchemaFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CliError::json("schema file", e))
    }

    /// Build every collection on `session`, then declare the associations.
    ///
    /// Collections are built first so associations may point at collections
    /// declared later in the file.
    pub fn load(&self, session: &Session, types: &TypeMap) -> Result<()> {
        for (name, schema) in &self.collections {
            let config = schema.config(types)?;
            session.collection(name, config)?;
        }

        for (name, schema) in &self.collections {
            let collection = session.registry().get(name)?;
            for association in &schema.associations {
                let kind: AssociationKind = association.kind.parse()?;
                let options = association.options()?;
                match kind {
                    AssociationKind::BelongsTo => collection.belongs_to(&association.name, options),
                    AssociationKind::HasOne => collection.has_one(&association.name, options),
                    AssociationKind::HasMany => collection.has_many(&association.name, options),
                    AssociationKind::BelongsToMany => {
                        collection.belongs_to_many(&association.name, options)
                    }
                }?;
            }
        }

        tracing::info!(collections = self.collections.len(), "schema loaded");
        Ok(())
    }
}

impl CollectionSchema {
    fn config(&self, types: &TypeMap) -> Result<CollectionConfig> {
        let mut config = CollectionConfig::new();
        if let Some(table) = &self.table {
            config = config.with_table(table);
        }
        if let Some(key) = &self.primary_key {
            config = config.with_primary_key(key);
        }
        for (column, type_name) in &self.columns {
            let column_type = types.build(type_name).map_err(|_| {
                CliError::Schema(format!("column '{}' has unknown type '{}'", column, type_name))
            })?;
            config = config.with_column(ColumnDef::new(column, column_type));
        }
        Ok(config)
    }
}

impl AssociationSchema {
    fn options(&self) -> Result<AssociationOptions> {
        let mut options = AssociationOptions::new();
        if let Some(target) = &self.target {
            options = options.target(target);
        }
        if let Some(key) = &self.foreign_key {
            options = options.foreign_key(key);
        }
        if let Some(key) = &self.target_foreign_key {
            options = options.target_foreign_key(key);
        }
        if let Some(property) = &self.property {
            options = options.property(property);
        }
        if let Some(strategy) = &self.strategy {
            options = options.strategy(strategy.parse::<Strategy>()?);
        }
        if let Some(through) = &self.through {
            options = options.through(through);
        }
        if let Some(conditions) = &self.conditions {
            for condition in parse_conditions("conditions", conditions)? {
                options = options.condition(condition);
            }
        }
        if let Some(sort) = &self.sort {
            for order in parse_order("sort", sort)? {
                options = options.sort(order);
            }
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormload_core::{NullExecutor, ScalarType};
    use pretty_assertions::assert_eq;

    const BLOG: &str = r#"{
        "collections": {
            "author": {
                "table": "authors",
                "columns": {"id": "integer", "name": "string"},
                "associations": [
                    {"kind": "has_many", "name": "article", "sort": {"title": "desc"}}
                ]
            },
            "article": {
                "columns": {"id": "integer", "author_id": "integer", "title": "string"},
                "associations": [
                    {"kind": "belongs_to", "name": "author"},
                    {"kind": "belongs_to_many", "name": "tag", "strategy": "subquery"}
                ]
            },
            "tag": {"columns": {"id": "integer", "name": "string"}}
        }
    }"#;

    #[test]
    fn test_load_declares_collections_and_associations() {
        let session = Session::new(NullExecutor);
        SchemaFile::parse(BLOG)
            .unwrap()
            .load(&session, &TypeMap::new())
            .unwrap();

        let author = session.registry().get("author").unwrap();
        assert_eq!(author.table(), "authors");
        assert_eq!(author.column_type("name"), Some(ScalarType::String));

        let articles = author.association("article").unwrap();
        assert_eq!(articles.kind, AssociationKind::HasMany);
        assert_eq!(articles.sort.len(), 1);

        let article = session.registry().get("article").unwrap();
        let names: Vec<String> = article.associations().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["author", "tag"]);
        assert_eq!(
            article.association("tag").unwrap().strategy,
            Some(Strategy::Subquery)
        );
    }

    #[test]
    fn test_unknown_column_type() {
        let schema = SchemaFile::parse(r#"{"collections": {"a": {"columns": {"id": "money"}}}}"#)
            .unwrap();
        let error = schema
            .load(&Session::new(NullExecutor), &TypeMap::new())
            .unwrap_err();
        assert!(error.to_string().contains("unknown type 'money'"));
    }

    #[test]
    fn test_unknown_association_kind() {
        let schema = SchemaFile::parse(
            r#"{"collections": {"a": {"associations": [{"kind": "owns", "name": "b"}]}}}"#,
        )
        .unwrap();
        let error = schema
            .load(&Session::new(NullExecutor), &TypeMap::new())
            .unwrap_err();
        assert!(matches!(
            error,
            CliError::Engine(ormload_core::Error::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(SchemaFile::parse(r#"{"collections": {"a": {"tabel": "x"}}}"#).is_err());
    }
}
