//! Engine configuration.

use crate::catalog::Strategy;

/// Default buffering mode for result sets.
pub const DEFAULT_BUFFER_RESULTS: bool = true;

/// Default fetch strategy for to-many associations.
pub const DEFAULT_TO_MANY_STRATEGY: Strategy = Strategy::Select;

/// Default maximum depth of a contain tree.
pub const DEFAULT_MAX_CONTAIN_DEPTH: usize = 8;

/// Primary key column assumed when a collection does not declare one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Bound parameter placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` for every parameter (SQLite, MySQL).
    #[default]
    Question,
    /// `$1`, `$2`, ... (PostgreSQL).
    Numbered,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether result sets cache rows for repeated iteration.
    pub buffer_results: bool,

    /// Strategy for to-many associations that declare none.
    pub to_many_strategy: Strategy,

    /// Maximum nesting depth of a contain tree.
    pub max_contain_depth: usize,

    /// Placeholder syntax emitted by the SQL renderer.
    pub placeholder_style: PlaceholderStyle,

    /// Append the target primary key to the ordering of auxiliary loads.
    pub stable_auxiliary_order: bool,
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            buffer_results: DEFAULT_BUFFER_RESULTS,
            to_many_strategy: DEFAULT_TO_MANY_STRATEGY,
            max_contain_depth: DEFAULT_MAX_CONTAIN_DEPTH,
            placeholder_style: PlaceholderStyle::default(),
            stable_auxiliary_order: true,
        }
    }

    /// Set the default buffering mode.
    pub fn with_buffer_results(mut self, buffer: bool) -> Self {
        self.buffer_results = buffer;
        self
    }

    /// Set the default to-many fetch strategy.
    pub fn with_to_many_strategy(mut self, strategy: Strategy) -> Self {
        self.to_many_strategy = strategy;
        self
    }

    /// Set the maximum contain depth.
    pub fn with_max_contain_depth(mut self, depth: usize) -> Self {
        self.max_contain_depth = depth;
        self
    }

    /// Set the placeholder syntax.
    pub fn with_placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder_style = style;
        self
    }

    /// Toggle primary key tie-breaking on auxiliary loads.
    pub fn with_stable_auxiliary_order(mut self, stable: bool) -> Self {
        self.stable_auxiliary_order = stable;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
