//! Map/reduce post-processing of query results.
//!
//! Stages run in registration order over the whole result of the previous
//! stage. Each input item is passed to the mapper with its key; the mapper
//! either emits final items or emits intermediate `(key, value)` pairs that
//! are grouped per key and handed to the stage's reducer once every input
//! has been mapped.

use super::result::DatumStream;
use crate::error::Result;
use indexmap::IndexMap;
use ormload_proto::{Datum, GroupKey, Value};
use std::fmt;
use std::sync::Arc;

/// Mapper callback: `(key, value, emitter)`.
pub type Mapper = Arc<dyn Fn(&Value, Datum, &mut Emitter) + Send + Sync>;

/// Reducer callback: `(key, grouped values, emitter)`.
pub type Reducer = Arc<dyn Fn(&Value, Vec<Datum>, &mut Emitter) + Send + Sync>;

/// A mapper and its optional reducer.
#[derive(Clone)]
pub struct MapReduceStage {
    mapper: Mapper,
    reducer: Option<Reducer>,
}

impl MapReduceStage {
    pub fn new<F>(mapper: F) -> Self
    where
        F: Fn(&Value, Datum, &mut Emitter) + Send + Sync + 'static,
    {
        Self {
            mapper: Arc::new(mapper),
            reducer: None,
        }
    }

    pub fn with_reducer<F>(mut self, reducer: F) -> Self
    where
        F: Fn(&Value, Vec<Datum>, &mut Emitter) + Send + Sync + 'static,
    {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    pub fn has_reducer(&self) -> bool {
        self.reducer.is_some()
    }

    /// Run this stage over keyed input.
    fn run(&self, input: Vec<(Value, Datum)>) -> Vec<(Value, Datum)> {
        let mut mapped = Emitter::default();
        for (key, value) in input {
            (self.mapper)(&key, value, &mut mapped);
        }

        let Emitter {
            mut emitted,
            intermediate,
        } = mapped;
        match &self.reducer {
            Some(reducer) => {
                let mut reduced = Emitter::default();
                for (_, (key, values)) in intermediate {
                    reducer(&key, values, &mut reduced);
                }
                emitted.extend(reduced.emitted);
                emitted.extend(reduced.intermediate.into_values().flat_map(flatten));
            }
            None => emitted.extend(intermediate.into_values().flat_map(flatten)),
        }

        emitted
            .into_iter()
            .enumerate()
            .map(|(i, (key, value))| (key.unwrap_or(Value::Int64(i as i64)), value))
            .collect()
    }
}

fn flatten((key, values): (Value, Vec<Datum>)) -> Vec<(Option<Value>, Datum)> {
    values
        .into_iter()
        .map(|value| (Some(key.clone()), value))
        .collect()
}

impl fmt::Debug for MapReduceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapReduceStage")
            .field("reducer", &self.reducer.is_some())
            .finish_non_exhaustive()
    }
}

/// Collector handed to mappers and reducers.
#[derive(Default)]
pub struct Emitter {
    emitted: Vec<(Option<Value>, Datum)>,
    intermediate: IndexMap<GroupKey, (Value, Vec<Datum>)>,
}

impl Emitter {
    /// Emit a final item, keyed by its position.
    pub fn emit(&mut self, value: impl Into<Datum>) {
        self.emitted.push((None, value.into()));
    }

    /// Emit a final item under an explicit key.
    pub fn emit_keyed(&mut self, key: impl Into<Value>, value: impl Into<Datum>) {
        self.emitted.push((Some(key.into()), value.into()));
    }

    /// Emit a value to be grouped under `key` for the reducer.
    pub fn emit_intermediate(&mut self, key: impl Into<Value>, value: impl Into<Datum>) {
        let key = key.into();
        self.intermediate
            .entry(key.group_key())
            .or_insert_with(|| (key, Vec::new()))
            .1
            .push(value.into());
    }
}

/// Stream that applies map/reduce stages on first pull.
pub struct MapReduce {
    source: Option<DatumStream>,
    stages: Vec<MapReduceStage>,
    output: std::vec::IntoIter<Datum>,
}

impl MapReduce {
    pub fn new(source: DatumStream, stages: Vec<MapReduceStage>) -> Self {
        Self {
            source: Some(source),
            stages,
            output: Vec::new().into_iter(),
        }
    }

    fn evaluate(&mut self, source: DatumStream) -> Result<()> {
        let mut items: Vec<(Value, Datum)> = source
            .enumerate()
            .map(|(i, item)| item.map(|datum| (Value::Int64(i as i64), datum)))
            .collect::<Result<_>>()?;
        for (index, stage) in self.stages.iter().enumerate() {
            let before = items.len();
            items = stage.run(items);
            tracing::debug!(
                stage = index,
                input = before,
                output = items.len(),
                "ran map/reduce stage"
            );
        }
        self.output = items
            .into_iter()
            .map(|(_, datum)| datum)
            .collect::<Vec<_>>()
            .into_iter();
        Ok(())
    }
}

impl Iterator for MapReduce {
    type Item = Result<Datum>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(source) = self.source.take() {
            if let Err(error) = self.evaluate(source) {
                return Some(Err(error));
            }
        }
        self.output.next().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormload_proto::Record;
    use pretty_assertions::assert_eq;

    fn source(items: Vec<Datum>) -> DatumStream {
        Box::new(items.into_iter().map(Ok))
    }

    fn records() -> Vec<Datum> {
        vec![
            Datum::Record(Record::new().with("a", 1i64)),
            Datum::Record(Record::new().with("a", 2i64)),
        ]
    }

    #[test]
    fn test_stages_run_in_order() {
        let extract = MapReduceStage::new(|_key, value, emitter| {
            let a = value
                .as_record()
                .and_then(|r| r.value("a"))
                .cloned()
                .unwrap_or(Value::Null);
            emitter.emit(a);
        });
        let increment = MapReduceStage::new(|key, value, emitter| {
            emitter.emit_intermediate(key.clone(), value);
        })
        .with_reducer(|_key, values, emitter| {
            let first = values[0].as_value().and_then(Value::as_i64).unwrap_or(0);
            emitter.emit(first + 1);
        });

        let output: Vec<Datum> = MapReduce::new(source(records()), vec![extract, increment])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(output, vec![Datum::from(2i64), Datum::from(3i64)]);
    }

    #[test]
    fn test_reducer_runs_once_per_key() {
        let items = vec![
            Datum::Record(Record::new().with("kind", "a").with("n", 1i64)),
            Datum::Record(Record::new().with("kind", "b").with("n", 2i64)),
            Datum::Record(Record::new().with("kind", "a").with("n", 3i64)),
        ];
        let stage = MapReduceStage::new(|_key, value, emitter| {
            let record = value.as_record().cloned().unwrap_or_default();
            let kind = record.value("kind").cloned().unwrap_or(Value::Null);
            let n = record.value("n").cloned().unwrap_or(Value::Null);
            emitter.emit_intermediate(kind, n);
        })
        .with_reducer(|key, values, emitter| {
            let total: i64 = values
                .iter()
                .filter_map(|d| d.as_value().and_then(Value::as_i64))
                .sum();
            emitter.emit_keyed(key.clone(), total);
        });

        let output: Vec<Datum> = MapReduce::new(source(items), vec![stage])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(output, vec![Datum::from(4i64), Datum::from(2i64)]);
    }

    #[test]
    fn test_without_reducer_intermediates_are_flattened() {
        let stage = MapReduceStage::new(|_key, value, emitter| {
            emitter.emit_intermediate("all", value);
        });
        let output: Vec<Datum> = MapReduce::new(source(records()), vec![stage])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(output, records());
    }

    #[test]
    fn test_source_error_is_reported() {
        let failing: DatumStream = Box::new(
            vec![Err(crate::Error::MissingCollection("x".into()))].into_iter(),
        );
        let mut stream = MapReduce::new(failing, vec![MapReduceStage::new(|_, v, e| e.emit(v))]);
        assert!(matches!(stream.next(), Some(Err(_))));
        assert!(stream.next().is_none());
    }
}
