//! Statement executor seam.

use crate::catalog::ColumnDef;
use crate::error::Result;
use ormload_proto::{CompiledStatement, Row};

/// Forward-only cursor over result rows.
pub type RowCursor = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// Runs compiled statements against a database.
pub trait StatementExecutor {
    /// Execute a statement and return its rows.
    ///
    /// Row keys are the statement's result keys (`AS` names, or column
    /// names for unaliased items). Failures are reported as
    /// [`crate::Error::Execution`] and abort the whole query.
    fn execute(&self, statement: &CompiledStatement) -> Result<RowCursor>;

    /// Describe the columns of `table`, `None` when unknown.
    fn describe(&self, _table: &str) -> Result<Option<Vec<ColumnDef>>> {
        Ok(None)
    }
}

impl<T: StatementExecutor + ?Sized> StatementExecutor for Box<T> {
    fn execute(&self, statement: &CompiledStatement) -> Result<RowCursor> {
        (**self).execute(statement)
    }

    fn describe(&self, table: &str) -> Result<Option<Vec<ColumnDef>>> {
        (**self).describe(table)
    }
}

/// Executor that never returns rows.
///
/// Useful for compiling and inspecting queries without a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExecutor;

impl StatementExecutor for NullExecutor {
    fn execute(&self, statement: &CompiledStatement) -> Result<RowCursor> {
        tracing::trace!(sql = %statement.sql, "null executor discarding statement");
        Ok(Box::new(std::iter::empty()))
    }
}
