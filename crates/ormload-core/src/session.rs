//! Sessions: a registry, an executor and the settings queries run with.

use crate::catalog::{Collection, CollectionConfig, Registry};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::StatementExecutor;
use crate::query::Query;
use crate::types::{BasicTypeConverter, TypeConverter};
use std::fmt;
use std::sync::Arc;

/// Entry point for building collections and queries.
pub struct Session {
    registry: Registry,
    executor: Box<dyn StatementExecutor>,
    converter: Arc<dyn TypeConverter>,
    config: EngineConfig,
}

impl Session {
    /// Create a session with default configuration.
    pub fn new(executor: impl StatementExecutor + 'static) -> Self {
        Self::with_config(executor, EngineConfig::default())
    }

    pub fn with_config(executor: impl StatementExecutor + 'static, config: EngineConfig) -> Self {
        Self {
            registry: Registry::new(),
            executor: Box::new(executor),
            converter: Arc::new(BasicTypeConverter),
            config,
        }
    }

    /// Replace the type converter used for parameters and hydration.
    pub fn with_converter(mut self, converter: impl TypeConverter + 'static) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn converter(&self) -> &Arc<dyn TypeConverter> {
        &self.converter
    }

    pub fn executor(&self) -> &dyn StatementExecutor {
        self.executor.as_ref()
    }

    /// Return the collection registered as `name`, building it on first use.
    ///
    /// When neither `config` nor stored configuration declares columns, the
    /// executor is asked to describe the table.
    pub fn collection(&self, name: &str, config: CollectionConfig) -> Result<Arc<Collection>> {
        if self.registry.contains(name) {
            return self.registry.get(name);
        }

        let mut config = match self.registry.config(name) {
            Some(stored) => config.or(&stored),
            None => config,
        };
        if config.columns.is_empty() {
            let probe = Collection::new(name, config.clone());
            if let Some(columns) = self.executor.describe(probe.table())? {
                tracing::debug!(
                    collection = %name,
                    table = %probe.table(),
                    columns = columns.len(),
                    "described table"
                );
                config.columns = columns;
            }
        }
        Ok(self.registry.build(name, config))
    }

    /// Start a query rooted at the collection registered as `root`.
    pub fn query(&self, root: &str) -> Result<Query<'_>> {
        let collection = self.registry.get(root)?;
        Ok(Query::new(self, collection))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
