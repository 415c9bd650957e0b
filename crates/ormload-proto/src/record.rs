//! Flat result rows and hydrated nested records.

use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

/// A flat result row, keyed by result key, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: IndexMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(key.into(), value.into());
    }

    /// Builder form of [`Row::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.columns.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.columns.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A hydrated record: column values at the top level, association
/// properties holding nested records or sequences of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Datum>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, datum: impl Into<Datum>) {
        self.fields.insert(key.into(), datum.into());
    }

    /// Builder form of [`Record::insert`].
    pub fn with(mut self, key: impl Into<String>, datum: impl Into<Datum>) -> Self {
        self.insert(key, datum);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Datum> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Datum> {
        self.fields.get_mut(key)
    }

    /// Remove a field, keeping the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<Datum> {
        self.fields.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Scalar value of a column.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(Datum::as_value)
    }

    /// Nested to-one record.
    pub fn record(&self, key: &str) -> Option<&Record> {
        self.get(key).and_then(Datum::as_record)
    }

    /// Nested to-many records.
    pub fn records(&self, key: &str) -> Option<&[Record]> {
        self.get(key).and_then(Datum::as_records)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datum)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Datum>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One hydrated datum: a scalar, a nested record or a sequence of records.
///
/// This is also the item type flowing through result sets and map/reduce
/// stages, since a mapper may emit plain scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Datum {
    Value(Value),
    Record(Record),
    Records(Vec<Record>),
}

impl Datum {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Datum::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Datum::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            Datum::Records(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Datum::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Value(Value::Null))
    }
}

impl From<Value> for Datum {
    fn from(v: Value) -> Self {
        Datum::Value(v)
    }
}

impl From<Record> for Datum {
    fn from(r: Record) -> Self {
        Datum::Record(r)
    }
}

impl From<Vec<Record>> for Datum {
    fn from(r: Vec<Record>) -> Self {
        Datum::Records(r)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Value(v.into())
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Value(v.into())
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Value(v.into())
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Value(v.into())
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Value(v.into())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Value(v.into())
    }
}
