//! Result hydration.
//!
//! Turns the flat `alias__column` rows of one statement into nested records
//! shaped by the plan's [`HydrationNode`] tree. Rows are consumed lazily;
//! when the plan groups rows, one record is held back until a row with a
//! different root identity arrives.

use super::planner::{Cardinality, HydrationNode, StatementPlan};
use crate::error::Result;
use crate::executor::RowCursor;
use crate::types::TypeConverter;
use ormload_proto::{Datum, GroupKey, Record, Row, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Streaming hydrator over a row cursor.
pub struct Hydrator {
    rows: RowCursor,
    root: Arc<HydrationNode>,
    converter: Arc<dyn TypeConverter>,
    claimed: HashSet<String>,
    group_keys: Vec<String>,
    pending: Option<(Vec<GroupKey>, Record)>,
    finished: bool,
}

impl Hydrator {
    pub fn new(rows: RowCursor, plan: &StatementPlan, converter: Arc<dyn TypeConverter>) -> Self {
        let mut claimed = HashSet::new();
        collect_keys(&plan.hydration, &mut claimed);
        Self {
            rows,
            root: plan.hydration.clone(),
            converter,
            claimed,
            group_keys: plan.group_keys.clone(),
            pending: None,
            finished: false,
        }
    }

    /// Hydrate a single row into a record, without grouping.
    pub fn hydrate_row(&self, row: &Row) -> Result<Record> {
        tracing::trace!(columns = row.len(), "hydrating row");
        let mut record = self.build(&self.root, row)?.unwrap_or_default();
        for (key, value) in row.iter() {
            if !self.claimed.contains(key) {
                record.insert(key, value.clone());
            }
        }
        Ok(record)
    }

    fn build(&self, node: &HydrationNode, row: &Row) -> Result<Option<Record>> {
        let mut record = Record::new();
        for slot in &node.columns {
            let raw = row.get(&slot.key).cloned().unwrap_or(Value::Null);
            let value = match slot.column_type {
                Some(column_type) => self.converter.to_host(column_type, raw)?,
                None => raw,
            };
            record.insert(slot.field.as_str(), value);
        }

        let is_root = node.property.is_empty();
        let own_presence = match &node.identity {
            Some(field) => Some(record.value(field).is_some_and(|v| !v.is_null())),
            None if node.columns.is_empty() => None,
            None => Some(
                node.columns
                    .iter()
                    .any(|slot| record.value(&slot.field).is_some_and(|v| !v.is_null())),
            ),
        };
        if !is_root && own_presence == Some(false) {
            return Ok(None);
        }

        let mut any_child = false;
        for child in &node.children {
            if let Some(nested) = self.build(child, row)? {
                any_child = true;
                let datum = match child.cardinality {
                    Cardinality::Many => Datum::Records(vec![nested]),
                    Cardinality::One => Datum::Record(nested),
                };
                record.insert(child.property.as_str(), datum);
            }
        }

        if is_root || own_presence.unwrap_or(any_child) {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    fn identity(&self, row: &Row) -> Vec<GroupKey> {
        self.group_keys
            .iter()
            .map(|key| row.get(key).map_or(GroupKey::Null, Value::group_key))
            .collect()
    }
}

impl Iterator for Hydrator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let row = match self.rows.next() {
                Some(Ok(row)) => row,
                Some(Err(error)) => {
                    self.finished = true;
                    return Some(Err(error));
                }
                None => {
                    self.finished = true;
                    return self.pending.take().map(|(_, record)| Ok(record));
                }
            };

            let record = match self.hydrate_row(&row) {
                Ok(record) => record,
                Err(error) => {
                    self.finished = true;
                    return Some(Err(error));
                }
            };
            if self.group_keys.is_empty() {
                return Some(Ok(record));
            }

            let identity = self.identity(&row);
            match self.pending.take() {
                Some((key, mut current)) if key == identity => {
                    merge(&mut current, record, &self.root);
                    self.pending = Some((key, current));
                }
                Some((_, complete)) => {
                    self.pending = Some((identity, record));
                    return Some(Ok(complete));
                }
                None => self.pending = Some((identity, record)),
            }
        }
    }
}

fn collect_keys(node: &HydrationNode, keys: &mut HashSet<String>) {
    keys.extend(node.columns.iter().map(|slot| slot.key.clone()));
    for child in &node.children {
        collect_keys(child, keys);
    }
}

/// Fold the associations of a later row of the same record into `existing`.
///
/// To-many records are appended unless they continue the last one; to-one
/// records keep their first values and only gain nested associations of
/// rows carrying the same identity.
fn merge(existing: &mut Record, mut incoming: Record, node: &HydrationNode) {
    for child in &node.children {
        let Some(datum) = incoming.remove(&child.property) else {
            continue;
        };
        match existing.get_mut(&child.property) {
            None => existing.insert(child.property.as_str(), datum),
            Some(Datum::Records(list)) => {
                if let Datum::Records(records) = datum {
                    for record in records {
                        push_or_merge(list, record, child);
                    }
                }
            }
            Some(Datum::Record(current)) => match datum {
                Datum::Record(record)
                    if child.identity.is_none() || same_record(current, &record, child) =>
                {
                    merge(current, record, child)
                }
                _ => {}
            },
            Some(Datum::Value(_)) => {}
        }
    }
}

fn push_or_merge(list: &mut Vec<Record>, record: Record, node: &HydrationNode) {
    let same = list
        .last()
        .is_some_and(|last| same_record(last, &record, node));
    match list.last_mut() {
        Some(last) if same => merge(last, record, node),
        _ => list.push(record),
    }
}

/// Check if two hydrated records of `node` carry the same non-null identity.
fn same_record(a: &Record, b: &Record, node: &HydrationNode) -> bool {
    let Some(field) = &node.identity else {
        return false;
    };
    let key = |r: &Record| r.value(field).map(Value::group_key);
    key(a).is_some() && key(a) == key(b)
}

/// Remove hidden key fields from a hydrated record and its nested records.
pub fn strip_hidden(node: &HydrationNode, record: &mut Record) {
    for field in node.hidden_fields() {
        record.remove(field);
    }
    for child in &node.children {
        match record.get_mut(&child.property) {
            Some(Datum::Record(nested)) => strip_hidden(child, nested),
            Some(Datum::Records(list)) => {
                for nested in list.iter_mut() {
                    strip_hidden(child, nested);
                }
            }
            _ => {}
        }
    }
}
