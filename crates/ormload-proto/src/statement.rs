//! SELECT statement IR.
//!
//! The planner builds a [`SelectStatement`] per executed query (the primary
//! statement plus one per deferred association load). A renderer turns it into
//! a [`CompiledStatement`] for the statement executor.

use crate::condition::{Condition, OrderSpec};
use crate::value::Value;
use std::fmt;

/// Separator between a collection alias and a column name in result keys.
pub const KEY_SEPARATOR: &str = "__";

/// Build the flat result key for a column of an aliased collection.
pub fn result_key(alias: &str, column: &str) -> String {
    format!("{}{}{}", alias, KEY_SEPARATOR, column)
}

/// Check whether `s` is a plain SQL identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prefix a bare column name with `alias`.
///
/// Names that are already qualified or are not identifiers (expressions,
/// `*`, function calls) are returned unchanged.
pub fn qualify_field(field: &str, alias: &str) -> String {
    if is_identifier(field) {
        format!("{}.{}", alias, field)
    } else {
        field.to_string()
    }
}

/// Split `alias.column` into its parts if `field` is a qualified column.
pub fn split_qualified(field: &str) -> Option<(&str, &str)> {
    let (alias, column) = field.split_once('.')?;
    if is_identifier(alias) && is_identifier(column) {
        Some((alias, column))
    } else {
        None
    }
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectItem {
    /// Result key (`AS` name). `None` keeps the expression's own name.
    pub key: Option<String>,
    /// Column reference or SQL expression.
    pub expr: String,
}

impl SelectItem {
    /// An unaliased field.
    pub fn field(expr: impl Into<String>) -> Self {
        Self {
            key: None,
            expr: expr.into(),
        }
    }

    /// A field with an explicit result key.
    pub fn aliased(key: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            expr: expr.into(),
        }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} AS {}", self.expr, key),
            None => write!(f, "{}", self.expr),
        }
    }
}

/// A table with the alias it is known by inside a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
        }
    }

    /// Parse `inner`/`left`/`right` in any case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INNER" => Some(JoinKind::Inner),
            "LEFT" => Some(JoinKind::Left),
            "RIGHT" => Some(JoinKind::Right),
            _ => None,
        }
    }
}

/// A join clause.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// Alias of the joined table inside the statement.
    pub alias: String,
    /// Physical table name.
    pub table: String,
    /// Join type.
    pub kind: JoinKind,
    /// ON conditions, combined with AND.
    pub conditions: Vec<Condition>,
}

impl JoinClause {
    /// Create an INNER join of `table` under `alias`.
    pub fn new(alias: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            table: table.into(),
            kind: JoinKind::Inner,
            conditions: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    /// WHERE conditions, combined with AND.
    pub conditions: Vec<Condition>,
    pub group_by: Vec<String>,
    /// HAVING conditions, combined with AND.
    pub having: Vec<Condition>,
    pub order_by: Vec<OrderSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectStatement {
    /// Create an empty statement selecting from `table` as `alias`.
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            select: Vec::new(),
            from: TableRef::new(table, alias),
            joins: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// All aliases introduced by this statement, root first.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.from.alias.as_str()).chain(self.joins.iter().map(|j| j.alias.as_str()))
    }

    /// Reduce the statement to a single-column key query over `expr`.
    ///
    /// Keeps FROM, joins, filters and grouping. Ordering survives only when
    /// the statement is limited, since it then decides which rows are in.
    pub fn project(&self, expr: impl Into<String>) -> SelectStatement {
        let limited = self.limit.is_some() || self.offset.is_some();
        SelectStatement {
            select: vec![SelectItem::field(expr)],
            from: self.from.clone(),
            joins: self.joins.clone(),
            conditions: self.conditions.clone(),
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            order_by: if limited {
                self.order_by.clone()
            } else {
                Vec::new()
            },
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledStatement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for CompiledStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}
