//! Track the heights of pending blocks as disjoint ranges.
//!
//! The [Tree] stores a set of heights as inclusive [Interval]s. Intervals never overlap and are
//! never adjacent: inserting a height that touches an existing interval extends it (merging with
//! the neighbor on the other side if it now touches that too) and removing a height from the
//! middle of an interval splits it in two.
//!
//! Every change to the set of intervals is recorded in the provided [Batch] so that the tree can
//! be recovered with [Tree::init] after a restart. [blocks] pairs these updates with the storage of
//! the block bytes themselves.

use crate::storage::{self, Batch, Cursor as _, Database};
use bytes::BufMut;
use commonware_codec::{DecodeExt, Encode, FixedSize, Write};
use std::collections::BTreeMap;

pub mod blocks;
pub use blocks::{add, cursor, get_block, remove};

/// Prefix of the keys used to persist intervals.
const INTERVAL_PREFIX: u8 = 1;

/// An inclusive range of heights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub lower: u64,
    pub upper: u64,
}

impl Interval {
    /// Create a new interval covering `[lower, upper]`.
    pub fn new(lower: u64, upper: u64) -> Self {
        assert!(lower <= upper, "interval bounds are inverted");
        Self { lower, upper }
    }
}

fn interval_key(lower: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + u64::SIZE);
    key.put_u8(INTERVAL_PREFIX);
    lower.write(&mut key);
    key
}

/// A set of heights, stored as disjoint, non-adjacent [Interval]s keyed by lower bound.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    /// Map from lower bound to upper bound.
    intervals: BTreeMap<u64, u64>,

    /// Total number of heights covered by all intervals.
    len: u64,
}

impl Tree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recover a tree from the intervals persisted in `db`.
    ///
    /// Returns [storage::Error::Corrupt] if a record cannot be decoded or if the records do not
    /// describe disjoint, non-adjacent intervals.
    pub async fn init<D: Database>(db: &D) -> Result<Self, storage::Error> {
        let mut tree = Self::new();
        let mut cursor = db.cursor(&[INTERVAL_PREFIX])?;

        // Records are visited in ascending order of lower bound
        let mut previous: Option<u64> = None;
        while let Some((key, value)) = cursor.next().await? {
            let (Ok(lower), Ok(upper)) = (u64::decode(&key[1..]), u64::decode(value)) else {
                return Err(storage::Error::Corrupt(key));
            };
            if upper < lower {
                return Err(storage::Error::Corrupt(key));
            }
            if let Some(previous) = previous {
                if previous.checked_add(1).map_or(true, |next| lower <= next) {
                    return Err(storage::Error::Corrupt(key));
                }
            }
            let Some(len) = (upper - lower)
                .checked_add(1)
                .and_then(|len| tree.len.checked_add(len))
            else {
                return Err(storage::Error::Corrupt(key));
            };
            tree.intervals.insert(lower, upper);
            tree.len = len;
            previous = Some(upper);
        }
        Ok(tree)
    }

    /// Returns the interval covering `height`, if any.
    pub fn get(&self, height: u64) -> Option<Interval> {
        let (&lower, &upper) = self.intervals.range(..=height).next_back()?;
        (height <= upper).then_some(Interval { lower, upper })
    }

    /// Returns true if `height` is in the tree.
    pub fn contains(&self, height: u64) -> bool {
        self.get(height).is_some()
    }

    /// Insert `height` into the tree, recording any changed intervals in `batch`.
    ///
    /// Returns false (and records nothing) if `height` was already present.
    pub fn insert(&mut self, batch: &mut Batch, height: u64) -> bool {
        if self.contains(height) {
            return false;
        }

        // Find the intervals ending just below and starting just above the height
        let below = height
            .checked_sub(1)
            .and_then(|prev| self.get(prev))
            .map(|interval| interval.lower);
        let above = height
            .checked_add(1)
            .and_then(|next| self.intervals.get(&next).map(|&upper| (next, upper)));

        match (below, above) {
            (Some(lower), Some((next, upper))) => {
                // Bridge the two intervals
                self.intervals.remove(&next);
                batch.delete(interval_key(next));
                self.intervals.insert(lower, upper);
                batch.put(interval_key(lower), upper.encode());
            }
            (Some(lower), None) => {
                self.intervals.insert(lower, height);
                batch.put(interval_key(lower), height.encode());
            }
            (None, Some((next, upper))) => {
                self.intervals.remove(&next);
                batch.delete(interval_key(next));
                self.intervals.insert(height, upper);
                batch.put(interval_key(height), upper.encode());
            }
            (None, None) => {
                self.intervals.insert(height, height);
                batch.put(interval_key(height), height.encode());
            }
        }
        self.len += 1;
        true
    }

    /// Remove `height` from the tree, recording any changed intervals in `batch`.
    ///
    /// Returns false (and records nothing) if `height` was not present.
    pub fn remove(&mut self, batch: &mut Batch, height: u64) -> bool {
        let Some(Interval { lower, upper }) = self.get(height) else {
            return false;
        };

        match (lower == height, upper == height) {
            (true, true) => {
                self.intervals.remove(&lower);
                batch.delete(interval_key(lower));
            }
            (true, false) => {
                self.intervals.remove(&lower);
                batch.delete(interval_key(lower));
                self.intervals.insert(height + 1, upper);
                batch.put(interval_key(height + 1), upper.encode());
            }
            (false, true) => {
                self.intervals.insert(lower, height - 1);
                batch.put(interval_key(lower), (height - 1).encode());
            }
            (false, false) => {
                // Split the interval around the height
                self.intervals.insert(lower, height - 1);
                batch.put(interval_key(lower), (height - 1).encode());
                self.intervals.insert(height + 1, upper);
                batch.put(interval_key(height + 1), upper.encode());
            }
        }
        self.len -= 1;
        true
    }

    /// Returns all intervals in ascending order.
    pub fn flatten(&self) -> Vec<Interval> {
        self.intervals
            .iter()
            .map(|(&lower, &upper)| Interval { lower, upper })
            .collect()
    }

    /// Returns the number of heights in the tree.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the tree contains no heights.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
