//! Shared fixtures for query integration tests.

#![allow(dead_code)]

use ormload_core::catalog::{AssociationOptions, CollectionConfig, ColumnDef};
use ormload_core::executor::{RowCursor, StatementExecutor};
use ormload_core::{Result, ScalarType, Session};
use ormload_proto::{CompiledStatement, Row, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Executor that records every statement and answers with queued rows.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Default)]
struct Recorded {
    statements: Vec<CompiledStatement>,
    responses: VecDeque<Vec<Row>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows returned by the next unanswered statement.
    pub fn respond(&self, rows: Vec<Row>) {
        self.inner.lock().responses.push_back(rows);
    }

    pub fn statements(&self) -> Vec<CompiledStatement> {
        self.inner.lock().statements.clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }
}

impl StatementExecutor for RecordingExecutor {
    fn execute(&self, statement: &CompiledStatement) -> Result<RowCursor> {
        let mut inner = self.inner.lock();
        inner.statements.push(statement.clone());
        let rows = inner.responses.pop_front().unwrap_or_default();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

pub fn row(values: &[(&str, Value)]) -> Row {
    values.iter().cloned().collect()
}

pub fn int(i: i64) -> Value {
    Value::Int64(i)
}

pub fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Authors with articles; articles with an author and tags.
pub fn blog_session(executor: RecordingExecutor) -> Session {
    let session = Session::new(executor);
    let author = session
        .collection(
            "author",
            CollectionConfig::new()
                .with_column(ColumnDef::new("id", ScalarType::Int64))
                .with_column(ColumnDef::new("name", ScalarType::String)),
        )
        .unwrap();
    let article = session
        .collection(
            "article",
            CollectionConfig::new()
                .with_column(ColumnDef::new("id", ScalarType::Int64))
                .with_column(ColumnDef::new("author_id", ScalarType::Int64))
                .with_column(ColumnDef::new("title", ScalarType::String)),
        )
        .unwrap();
    session
        .collection(
            "tag",
            CollectionConfig::new()
                .with_column(ColumnDef::new("id", ScalarType::Int64))
                .with_column(ColumnDef::new("name", ScalarType::String)),
        )
        .unwrap();
    author
        .has_many("article", AssociationOptions::new())
        .unwrap();
    article
        .belongs_to("author", AssociationOptions::new())
        .unwrap();
    article
        .belongs_to_many("tag", AssociationOptions::new())
        .unwrap();
    session
}
