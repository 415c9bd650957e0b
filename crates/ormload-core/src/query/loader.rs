//! Statement execution and deferred association loading.

use super::hydrator::{strip_hidden, Hydrator};
use super::planner::{DeferredLoad, KeyLocation, StatementPlan};
use super::sql;
use crate::catalog::Strategy;
use crate::config::PlaceholderStyle;
use crate::error::Result;
use crate::executor::StatementExecutor;
use crate::types::TypeConverter;
use indexmap::IndexMap;
use ormload_proto::{Condition, Datum, GroupKey, Record, SelectStatement, Value};
use std::sync::Arc;

/// Lazy stream of hydrated records.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Runs a statement plan against an executor.
pub struct Loader<'a> {
    executor: &'a dyn StatementExecutor,
    converter: Arc<dyn TypeConverter>,
    style: PlaceholderStyle,
}

impl<'a> Loader<'a> {
    pub fn new(
        executor: &'a dyn StatementExecutor,
        converter: Arc<dyn TypeConverter>,
        style: PlaceholderStyle,
    ) -> Self {
        Self {
            executor,
            converter,
            style,
        }
    }

    /// Execute the plan and return its hydrated records.
    ///
    /// Without deferred loads the primary rows are hydrated lazily. Otherwise
    /// every statement runs here, parents before children, and the records
    /// are returned fully assembled.
    pub fn load(&self, plan: &StatementPlan) -> Result<RecordStream> {
        let hydrator = self.run(plan, &plan.statement)?;
        let hydration = plan.hydration.clone();
        if plan.deferred.is_empty() {
            return Ok(Box::new(hydrator.map(move |record| {
                record.map(|mut record| {
                    strip_hidden(&hydration, &mut record);
                    record
                })
            })));
        }

        let mut records = hydrator.collect::<Result<Vec<_>>>()?;
        self.resolve_deferred(plan, &plan.statement, &mut records)?;
        for record in &mut records {
            strip_hidden(&hydration, record);
        }
        Ok(Box::new(records.into_iter().map(Ok)))
    }

    fn run(&self, plan: &StatementPlan, statement: &SelectStatement) -> Result<Hydrator> {
        let compiled = sql::render(statement, self.style);
        tracing::debug!(
            collection = %plan.collection,
            sql = %compiled.sql,
            params = compiled.params.len(),
            "executing statement"
        );
        let rows = self.executor.execute(&compiled)?;
        Ok(Hydrator::new(rows, plan, self.converter.clone()))
    }

    /// Load every deferred association of `plan` into `records`.
    ///
    /// `statement` is the statement that produced `records`, key filter
    /// included, so subquery loads select exactly the same parents.
    fn resolve_deferred(
        &self,
        plan: &StatementPlan,
        statement: &SelectStatement,
        records: &mut [Record],
    ) -> Result<()> {
        for load in &plan.deferred {
            let keys = parent_keys(records, load);
            if keys.is_empty() {
                tracing::debug!(association = %load.association, "no parent keys, skipping load");
                continue;
            }

            let mut child_statement = load.plan.statement.clone();
            child_statement
                .conditions
                .insert(0, self.key_filter(load, statement, &keys));
            let mut children = self
                .run(&load.plan, &child_statement)?
                .collect::<Result<Vec<_>>>()?;
            self.resolve_deferred(&load.plan, &child_statement, &mut children)?;

            let loaded = children.len();
            let mut groups: IndexMap<GroupKey, Vec<Record>> = IndexMap::new();
            for mut child in children {
                let key = child_key(&child, &load.key_location);
                strip_hidden(&load.plan.hydration, &mut child);
                if let Some(key) = key {
                    groups.entry(key).or_default().push(child);
                }
            }
            tracing::debug!(
                association = %load.association,
                strategy = %load.strategy,
                parents = keys.len(),
                loaded,
                "loaded association"
            );

            for_each_at_path(records, &load.parent_path, &mut |parent| {
                let key = parent
                    .value(&load.parent_field)
                    .filter(|v| !v.is_null())
                    .map(Value::group_key);
                if let Some(group) = key.and_then(|k| groups.get(&k)) {
                    parent.insert(load.property.as_str(), Datum::Records(group.clone()));
                }
            });
        }
        Ok(())
    }

    fn key_filter(
        &self,
        load: &DeferredLoad,
        parent_statement: &SelectStatement,
        keys: &IndexMap<GroupKey, Value>,
    ) -> Condition {
        match load.strategy {
            Strategy::Subquery => Condition::in_subquery(
                load.key_column.as_str(),
                parent_statement.project(load.parent_key_column.as_str()),
            ),
            Strategy::Select | Strategy::Join => Condition::in_values(
                load.key_column.as_str(),
                keys.values()
                    .map(|value| match load.parent_key_type {
                        Some(column_type) => self.converter.to_database(column_type, value.clone()),
                        None => value.clone(),
                    })
                    .collect(),
            ),
        }
    }
}

/// Distinct non-null parent keys, in first-seen order.
fn parent_keys(records: &mut [Record], load: &DeferredLoad) -> IndexMap<GroupKey, Value> {
    let mut keys = IndexMap::new();
    for_each_at_path(records, &load.parent_path, &mut |parent| {
        if let Some(value) = parent.value(&load.parent_field).filter(|v| !v.is_null()) {
            keys.entry(value.group_key()).or_insert_with(|| value.clone());
        }
    });
    keys
}

fn child_key(child: &Record, location: &KeyLocation) -> Option<GroupKey> {
    let value = match location {
        KeyLocation::Field(field) => child.value(field),
        KeyLocation::Nested { property, field } => child.record(property)?.value(field),
    }?;
    (!value.is_null()).then(|| value.group_key())
}

/// Visit the records found by following `path` from each of `records`.
fn for_each_at_path(records: &mut [Record], path: &[String], f: &mut dyn FnMut(&mut Record)) {
    for record in records {
        visit(record, path, f);
    }
}

fn visit(record: &mut Record, path: &[String], f: &mut dyn FnMut(&mut Record)) {
    let Some((head, rest)) = path.split_first() else {
        f(record);
        return;
    };
    match record.get_mut(head) {
        Some(Datum::Record(nested)) => visit(nested, rest, f),
        Some(Datum::Records(list)) => {
            for nested in list.iter_mut() {
                visit(nested, rest, f);
            }
        }
        _ => {}
    }
}
