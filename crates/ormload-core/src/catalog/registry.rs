//! Collection registry.

use super::collection::{Collection, CollectionConfig};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Registry of collections, owned by a session.
///
/// Building a name twice returns the same descriptor until the registry is
/// cleared or the name dropped.
#[derive(Debug, Default)]
pub struct Registry {
    collections: RwLock<IndexMap<String, Arc<Collection>>>,
    configs: RwLock<IndexMap<String, CollectionConfig>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store configuration used when `name` is built later.
    pub fn configure(&self, name: impl Into<String>, config: CollectionConfig) {
        self.configs.write().insert(name.into(), config);
    }

    /// Configuration stored for `name`, if any.
    pub fn config(&self, name: &str) -> Option<CollectionConfig> {
        self.configs.read().get(name).cloned()
    }

    /// Return the collection registered as `name`, building it on first use.
    ///
    /// `config` is merged over any configuration stored with
    /// [`Registry::configure`]. It is ignored once the collection exists.
    pub fn build(&self, name: &str, config: CollectionConfig) -> Arc<Collection> {
        if let Some(existing) = self.collections.read().get(name) {
            if config != CollectionConfig::default() {
                tracing::warn!(collection = %name, "collection already built, ignoring config");
            }
            return existing.clone();
        }

        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            return existing.clone();
        }
        let config = match self.configs.read().get(name) {
            Some(stored) => config.or(stored),
            None => config,
        };
        let collection = Arc::new(Collection::new(name, config));
        tracing::debug!(
            collection = %name,
            table = %collection.table(),
            columns = collection.columns().len(),
            "built collection"
        );
        collections.insert(name.to_string(), collection.clone());
        collection
    }

    /// Look up a built collection.
    pub fn get(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MissingCollection(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Names of built collections, in build order.
    pub fn names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.collections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.read().is_empty()
    }

    /// Forget one collection and its stored configuration.
    pub fn drop(&self, name: &str) -> bool {
        self.configs.write().shift_remove(name);
        self.collections.write().shift_remove(name).is_some()
    }

    /// Forget every collection and stored configuration.
    pub fn clear(&self) {
        self.collections.write().clear();
        self.configs.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnDef;
    use crate::types::ScalarType;

    #[test]
    fn test_build_is_idempotent() {
        let registry = Registry::new();
        let first = registry.build("article", CollectionConfig::new());
        let second = registry.build("article", CollectionConfig::new().with_table("posts"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.table(), "articles");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_configure_before_build() {
        let registry = Registry::new();
        registry.configure(
            "ArticleTag",
            CollectionConfig::new()
                .with_table("articles_tags")
                .with_column(ColumnDef::new("article_id", ScalarType::Int64)),
        );
        let junction = registry.build("ArticleTag", CollectionConfig::new());
        assert_eq!(junction.table(), "articles_tags");
        assert_eq!(junction.columns().len(), 1);
    }

    #[test]
    fn test_get_missing_collection() {
        let registry = Registry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(Error::MissingCollection(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_clear_and_drop() {
        let registry = Registry::new();
        let before = registry.build("author", CollectionConfig::new());
        registry.build("article", CollectionConfig::new());
        assert_eq!(registry.names(), vec!["author", "article"]);

        assert!(registry.drop("article"));
        assert!(!registry.drop("article"));
        assert!(!registry.contains("article"));

        registry.clear();
        assert!(registry.is_empty());
        let after = registry.build("author", CollectionConfig::new());
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
