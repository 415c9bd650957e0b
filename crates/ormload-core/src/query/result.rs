//! Result sets.

use crate::error::Result;
use ormload_proto::{Datum, Record};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Lazy stream of result items.
pub type DatumStream = Box<dyn Iterator<Item = Result<Datum>> + Send>;

struct State {
    source: Option<DatumStream>,
    /// Items pulled so far; only kept when buffered.
    buffer: Vec<Result<Datum>>,
}

impl State {
    fn pull(&mut self) -> Option<Result<Datum>> {
        let item = self.source.as_mut()?.next();
        if item.is_none() {
            self.source = None;
        }
        item
    }
}

/// Handle to the results of one query execution.
///
/// Clones share the same underlying stream. A buffered set caches every
/// item it pulls, so it can be iterated again and indexed; an unbuffered set
/// is forward-only and each item is handed out once.
#[derive(Clone)]
pub struct ResultSet {
    state: Arc<Mutex<State>>,
    buffered: bool,
}

impl ResultSet {
    pub fn buffered(stream: DatumStream) -> Self {
        Self::with_mode(stream, true)
    }

    pub fn unbuffered(stream: DatumStream) -> Self {
        Self::with_mode(stream, false)
    }

    fn with_mode(stream: DatumStream, buffered: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                source: Some(stream),
                buffer: Vec::new(),
            })),
            buffered,
        }
    }

    /// A buffered set over items that are already materialized.
    pub fn from_vec(items: Vec<Datum>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                source: None,
                buffer: items.into_iter().map(Ok).collect(),
            })),
            buffered: true,
        }
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self::from_vec(records.into_iter().map(Datum::Record).collect())
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Check if both handles refer to the same execution.
    pub fn same_as(&self, other: &ResultSet) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Iterate over the items.
    ///
    /// Buffered sets start from the first item on every call; unbuffered
    /// sets continue where the previous consumer stopped.
    pub fn iter(&self) -> ResultIter {
        ResultIter {
            set: self.clone(),
            position: 0,
        }
    }

    /// The first item. On an unbuffered set this is the next unread item.
    pub fn first(&self) -> Result<Option<Datum>> {
        self.get(0)
    }

    /// The item at `index`, pulling from the stream as needed.
    ///
    /// On an unbuffered set the index counts from the next unread item and
    /// everything before it is discarded.
    pub fn get(&self, index: usize) -> Result<Option<Datum>> {
        if self.buffered {
            self.fetch(index).transpose()
        } else {
            self.iter().nth(index).transpose()
        }
    }

    /// Collect every remaining item, failing on the first error.
    pub fn to_vec(&self) -> Result<Vec<Datum>> {
        self.iter().collect()
    }

    fn fetch(&self, index: usize) -> Option<Result<Datum>> {
        let mut state = self.state.lock();
        while state.buffer.len() <= index {
            let item = state.pull()?;
            state.buffer.push(item);
        }
        state.buffer.get(index).cloned()
    }

    fn next_unbuffered(&self) -> Option<Result<Datum>> {
        let mut state = self.state.lock();
        if !state.buffer.is_empty() {
            return Some(state.buffer.remove(0));
        }
        state.pull()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResultSet")
            .field("buffered", &self.buffered)
            .field("cached", &state.buffer.len())
            .field("exhausted", &state.source.is_none())
            .finish()
    }
}

/// Iterator over a [`ResultSet`].
pub struct ResultIter {
    set: ResultSet,
    position: usize,
}

impl Iterator for ResultIter {
    type Item = Result<Datum>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.set.buffered {
            let item = self.set.fetch(self.position)?;
            self.position += 1;
            Some(item)
        } else {
            self.set.next_unbuffered()
        }
    }
}

impl IntoIterator for &ResultSet {
    type Item = Result<Datum>;
    type IntoIter = ResultIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
