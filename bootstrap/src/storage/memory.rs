//! In-memory [Database] with copy-on-write snapshots.
//!
//! Cursors share the map that was current when they were acquired. A write made while any
//! cursor is outstanding clones the map before applying, which mirrors the cost a persistent
//! store pays to retain an old revision for a long-lived iterator.

use super::{Batch, Cursor, Database, Error};
use bytes::Bytes;
use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, Mutex},
};

type Map = BTreeMap<Vec<u8>, Bytes>;

#[derive(Default)]
struct State {
    data: Arc<Map>,
    closed: bool,
    writes: usize,
    cursors: usize,
}

/// In-memory [Database] shared between all of its clones.
#[derive(Clone, Default)]
pub struct Memory {
    state: Arc<Mutex<State>>,
}

impl Memory {
    /// Reject all future operations with [Error::Closed].
    ///
    /// Outstanding cursors keep serving their snapshot.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }

    /// Number of batches written so far.
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// Number of cursors acquired so far.
    pub fn cursors(&self) -> usize {
        self.state.lock().unwrap().cursors
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().data.len()
    }

    /// Returns true if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `batch` atomically.
    pub(super) fn apply(&self, batch: Batch) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::Closed);
        }
        state.writes += 1;
        let data = Arc::make_mut(&mut state.data);
        for (key, value) in batch {
            match value {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Returns every stored entry as a batch of puts.
    pub(super) fn snapshot(&self) -> Batch {
        let data = self.state.lock().unwrap().data.clone();
        let mut batch = Batch::new();
        for (key, value) in data.iter() {
            batch.put(key.clone(), value.clone());
        }
        batch
    }
}

impl Database for Memory {
    type Cursor = MemoryCursor;

    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::Closed);
        }
        Ok(state.data.get(key).cloned())
    }

    async fn write(&mut self, batch: Batch) -> Result<(), Error> {
        self.apply(batch)
    }

    fn cursor(&self, prefix: &[u8]) -> Result<Self::Cursor, Error> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::Closed);
        }
        state.cursors += 1;
        Ok(MemoryCursor {
            snapshot: state.data.clone(),
            prefix: prefix.to_vec(),
            last: None,
        })
    }
}

/// [Cursor] over a snapshot of a [Memory] database.
pub struct MemoryCursor {
    snapshot: Arc<Map>,
    prefix: Vec<u8>,
    last: Option<Vec<u8>>,
}

impl Cursor for MemoryCursor {
    async fn next(&mut self) -> Result<Option<(Vec<u8>, Bytes)>, Error> {
        let start = match &self.last {
            Some(last) => Bound::Excluded(last.as_slice()),
            None => Bound::Included(self.prefix.as_slice()),
        };
        let Some((key, value)) = self
            .snapshot
            .range::<[u8], _>((start, Bound::Unbounded))
            .next()
        else {
            return Ok(None);
        };
        if !key.starts_with(&self.prefix) {
            return Ok(None);
        }
        self.last = Some(key.clone());
        Ok(Some((key.clone(), value.clone())))
    }
}
