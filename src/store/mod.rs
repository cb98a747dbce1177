// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Capability abstraction over an ordered byte-key KV store
//!
//! The tree engine talks to storage exclusively through [`Store`]: point
//! reads and writes, atomic multi-key batches, and bounded range scans in
//! both directions. Keys are ordered strictly lexicographically on their
//! bytes (empty key < `0x00` < `0x00 0x00` < … < `0xff`).

mod memory;

pub use memory::MemoryStore;

use crate::Slice;

/// Scan direction for range iteration
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Ascending key order
    Forward,

    /// Descending key order
    Reverse,
}

/// A single mutation inside a [`Batch`]
#[derive(Clone, Debug)]
pub enum BatchOp {
    /// Insert or overwrite a key
    Put {
        /// Key bytes
        key: Slice,
        /// Value bytes
        value: Slice,
    },

    /// Remove a key (a no-op if absent)
    Delete {
        /// Key bytes
        key: Slice,
    },
}

/// An ordered list of mutations that is applied atomically
#[derive(Clone, Debug, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, key: impl Into<Slice>, value: impl Into<Slice>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: impl Into<Slice>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes the batch into its operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Iterator over a key range, yielding `(key, value)` pairs
///
/// Implementations must not borrow the store: iterators stay valid while
/// writes proceed, observing each atomic batch either fully or not at all.
pub type RangeIter = Box<dyn Iterator<Item = crate::Result<(Slice, Slice)>> + Send>;

/// An ordered byte-key KV store
///
/// The write pipeline owns batch commits exclusively; readers share the
/// handle for point gets and range scans.
pub trait Store: Send + Sync + 'static {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> crate::Result<Option<Slice>>;

    /// Inserts or overwrites a single key.
    fn put(&self, key: &[u8], value: &[u8]) -> crate::Result<()>;

    /// Removes a single key. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> crate::Result<()>;

    /// Applies all operations of `batch` atomically: a concurrent reader
    /// observes either none or all of them.
    fn apply(&self, batch: Batch) -> crate::Result<()>;

    /// Iterates over `[start, end)` in the given direction.
    fn range(&self, start: &[u8], end: &[u8], direction: Direction) -> RangeIter;

    /// Returns the first `(key, value)` pair of `[start, end)` in the given
    /// direction, if any.
    fn first_in_range(
        &self,
        start: &[u8],
        end: &[u8],
        direction: Direction,
    ) -> crate::Result<Option<(Slice, Slice)>> {
        self.range(start, end, direction).next().transpose()
    }
}
