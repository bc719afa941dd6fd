//! Key-value storage used to persist pending blocks and the intervals that track them.
//!
//! The bootstrapper only needs three things from a store: point reads, atomic application
//! of a [Batch] of writes, and an ordered [Cursor] over all keys sharing a prefix. A cursor
//! observes a consistent snapshot of the store taken when it is acquired and is released by
//! dropping it. Holding a cursor for a long time may force a store to retain old data, so
//! callers that iterate over large ranges should periodically reacquire it.

use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_utils::hex;
use std::{collections::BTreeMap, future::Future};
use thiserror::Error;

pub mod journal;
pub mod memory;

/// Errors that can occur when interacting with a [Database].
#[derive(Debug, Error)]
pub enum Error {
    #[error("database closed")]
    Closed,
    #[error("corrupt record: {}", hex(.0))]
    Corrupt(Vec<u8>),
    #[error("runtime error: {0}")]
    Runtime(#[from] commonware_runtime::Error),
}

/// A set of puts and deletes applied to a [Database] atomically.
///
/// If the same key is written more than once, the last write wins.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    /// If the value is `Some`, the key is being created or updated.
    /// If the value is `None`, the key is being deleted.
    ops: BTreeMap<Vec<u8>, Option<Bytes>>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value` when the batch is written.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Bytes>) {
        self.ops.insert(key.into(), Some(value.into()));
    }

    /// Delete `key` when the batch is written.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.insert(key.into(), None);
    }

    /// Number of distinct keys touched by the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = (Vec<u8>, Option<Bytes>);
    type IntoIter = std::collections::btree_map::IntoIter<Vec<u8>, Option<Bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Read a length-prefixed byte string.
fn read_bytes(buf: &mut impl Buf) -> Result<Bytes, CodecError> {
    let len = u32::read(buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::EndOfBuffer);
    }
    Ok(buf.copy_to_bytes(len))
}

impl Write for Batch {
    fn write(&self, buf: &mut impl BufMut) {
        (self.ops.len() as u32).write(buf);
        for (key, value) in &self.ops {
            (key.len() as u32).write(buf);
            buf.put_slice(key);
            value.is_some().write(buf);
            if let Some(value) = value {
                (value.len() as u32).write(buf);
                buf.put_slice(value);
            }
        }
    }
}

impl EncodeSize for Batch {
    fn encode_size(&self) -> usize {
        self.ops.iter().fold(u32::SIZE, |size, (key, value)| {
            size + u32::SIZE
                + key.len()
                + bool::SIZE
                + value.as_ref().map_or(0, |value| u32::SIZE + value.len())
        })
    }
}

impl Read for Batch {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let count = u32::read(buf)?;
        let mut batch = Self::new();
        for _ in 0..count {
            let key = read_bytes(buf)?.to_vec();
            let value = if bool::read(buf)? {
                Some(read_bytes(buf)?)
            } else {
                None
            };
            batch.ops.insert(key, value);
        }
        Ok(batch)
    }
}

/// An ordered iterator over the entries of a [Database] that share some prefix.
pub trait Cursor: Send {
    /// Advance to the next entry, returning its key and value.
    ///
    /// Returns `None` once the cursor is exhausted.
    fn next(&mut self) -> impl Future<Output = Result<Option<(Vec<u8>, Bytes)>, Error>> + Send;
}

/// A key-value store that supports atomic batches and snapshot cursors.
pub trait Database: Clone + Send + Sync + 'static {
    /// Cursor returned by [Database::cursor].
    type Cursor: Cursor;

    /// Get the value stored at `key`.
    fn get(&self, key: &[u8]) -> impl Future<Output = Result<Option<Bytes>, Error>> + Send;

    /// Apply all operations in `batch` atomically.
    fn write(&mut self, batch: Batch) -> impl Future<Output = Result<(), Error>> + Send;

    /// Acquire a cursor over all keys starting with `prefix`, in ascending key order.
    ///
    /// The cursor reflects the store at the time of acquisition and is released on drop.
    fn cursor(&self, prefix: &[u8]) -> Result<Self::Cursor, Error>;

    /// Set `key` to `value`.
    fn put(
        &mut self,
        key: impl Into<Vec<u8>> + Send,
        value: impl Into<Bytes> + Send,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        let mut batch = Batch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Delete `key` (a no-op if it does not exist).
    fn delete(
        &mut self,
        key: impl Into<Vec<u8>> + Send,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        let mut batch = Batch::new();
        batch.delete(key);
        self.write(batch)
    }
}
