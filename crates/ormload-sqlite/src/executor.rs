//! Statement execution over a `rusqlite` connection.

use crate::error::Result;
use ormload_core::catalog::ColumnDef;
use ormload_core::executor::{RowCursor, StatementExecutor};
use ormload_core::{ScalarType, TypeMap};
use ormload_proto::{CompiledStatement, Row, Value};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;

/// Executes compiled statements on one SQLite connection.
///
/// Rows are read eagerly while the connection is locked; the returned
/// cursor owns them.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
    types: TypeMap,
}

impl SqliteExecutor {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            types: TypeMap::new(),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening sqlite database");
        Ok(Self::new(Connection::open(path)?))
    }

    /// Use `types` to resolve declared column types during introspection.
    pub fn with_types(mut self, types: TypeMap) -> Self {
        self.types = types;
        self
    }

    /// Run one or more `;`-separated statements without results.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Run `f` with the locked connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.conn.lock())
    }

    fn query(&self, statement: &CompiledStatement) -> Result<Vec<Row>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&statement.sql)?;
        let keys: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let params = statement.params.iter().map(to_sql);
        let mut rows = stmt.query(params_from_iter(params))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Row::with_capacity(keys.len());
            for (index, key) in keys.iter().enumerate() {
                values.insert(key.as_str(), from_sql(row.get_ref(index)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn table_info(&self, table: &str) -> Result<Vec<ColumnDef>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")?;
        let rows = stmt.query_map([table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, declared, not_null) = row?;
            let column = match self.column_type(&declared) {
                Some(column_type) => ColumnDef::new(name, column_type),
                None => ColumnDef::untyped(name),
            };
            columns.push(if not_null { column } else { column.nullable() });
        }
        Ok(columns)
    }

    /// Resolve a declared SQLite type.
    ///
    /// Anything with `INT` in it is a 64-bit integer; other names are looked
    /// up in the type map before falling back to SQLite's affinity rules.
    fn column_type(&self, declared: &str) -> Option<ScalarType> {
        let base = declared
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if base.is_empty() {
            return None;
        }
        if base.contains("int") {
            return Some(ScalarType::Int64);
        }
        if let Some(column_type) = self.types.get(&base) {
            return Some(column_type);
        }
        if base.contains("char") || base.contains("clob") || base.contains("text") {
            Some(ScalarType::Text)
        } else if base.contains("blob") {
            Some(ScalarType::Bytes)
        } else if base.contains("real") || base.contains("floa") || base.contains("doub") {
            Some(ScalarType::Float64)
        } else if base.contains("bool") {
            Some(ScalarType::Bool)
        } else {
            None
        }
    }
}

impl StatementExecutor for SqliteExecutor {
    fn execute(&self, statement: &CompiledStatement) -> ormload_core::Result<RowCursor> {
        tracing::debug!(
            sql = %statement.sql,
            params = statement.params.len(),
            "executing on sqlite"
        );
        let rows = self.query(statement)?;
        tracing::trace!(rows = rows.len(), "read rows");
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn describe(&self, table: &str) -> ormload_core::Result<Option<Vec<ColumnDef>>> {
        let columns = self.table_info(table)?;
        if columns.is_empty() {
            tracing::debug!(%table, "table not found, no columns described");
            return Ok(None);
        }
        Ok(Some(columns))
    }
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor").finish_non_exhaustive()
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int32(i) => SqlValue::Integer(i64::from(*i)),
        Value::Int64(i) | Value::Timestamp(i) => SqlValue::Integer(*i),
        Value::Float32(f) => SqlValue::Real(f64::from(*f)),
        Value::Float64(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Uuid(u) => SqlValue::Blob(u.to_vec()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}
