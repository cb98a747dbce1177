// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Batch, BatchOp, Direction, RangeIter, Store};
use crate::Slice;
use crossbeam_skiplist::SkipMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

/// How many entries a range iterator pulls per latch acquisition
const CHUNK_SIZE: usize = 64;

/// In-memory ordered KV store
///
/// The content lives in a lock-free skiplist; a commit latch makes batches
/// atomic with respect to readers. Range iterators pull chunks of entries
/// per latch acquisition and re-seek by last key, so scans never pin the
/// latch for their whole lifetime.
///
/// Cloning is cheap and shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    items: SkipMap<Slice, Slice>,

    /// Batches hold this exclusively, readers hold it shared per chunk.
    latch: RwLock<()>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> crate::Result<Option<Slice>> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let _latch = self.inner.latch.read().expect("lock poisoned");

        Ok(self.inner.items.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> crate::Result<()> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let _latch = self.inner.latch.write().expect("lock poisoned");

        self.inner.items.insert(key.into(), value.into());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> crate::Result<()> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let _latch = self.inner.latch.write().expect("lock poisoned");

        self.inner.items.remove(key);
        Ok(())
    }

    fn apply(&self, batch: Batch) -> crate::Result<()> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let _latch = self.inner.latch.write().expect("lock poisoned");

        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    self.inner.items.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    self.inner.items.remove(&key);
                }
            }
        }

        Ok(())
    }

    fn range(&self, start: &[u8], end: &[u8], direction: Direction) -> RangeIter {
        if start >= end {
            return Box::new(std::iter::empty());
        }

        Box::new(MemoryRangeIter {
            inner: self.inner.clone(),
            lo: Bound::Included(Slice::from(start)),
            hi: Bound::Excluded(Slice::from(end)),
            direction,
            chunk: Vec::new(),
            pos: 0,
            exhausted: false,
        })
    }
}

struct MemoryRangeIter {
    inner: Arc<Inner>,

    /// Lower cursor bound, tightened as forward chunks are consumed
    lo: Bound<Slice>,

    /// Upper cursor bound, tightened as reverse chunks are consumed
    hi: Bound<Slice>,

    direction: Direction,
    chunk: Vec<(Slice, Slice)>,
    pos: usize,
    exhausted: bool,
}

impl MemoryRangeIter {
    fn refill(&mut self) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let _latch = self.inner.latch.read().expect("lock poisoned");

        let range = self
            .inner
            .items
            .range::<[u8], _>((as_bytes_bound(&self.lo), as_bytes_bound(&self.hi)));

        self.chunk.clear();
        self.pos = 0;

        match self.direction {
            Direction::Forward => {
                for entry in range.take(CHUNK_SIZE) {
                    self.chunk.push((entry.key().clone(), entry.value().clone()));
                }

                if let Some((key, _)) = self.chunk.last() {
                    self.lo = Bound::Excluded(key.clone());
                }
            }
            Direction::Reverse => {
                for entry in range.rev().take(CHUNK_SIZE) {
                    self.chunk.push((entry.key().clone(), entry.value().clone()));
                }

                if let Some((key, _)) = self.chunk.last() {
                    self.hi = Bound::Excluded(key.clone());
                }
            }
        }

        if self.chunk.len() < CHUNK_SIZE {
            self.exhausted = true;
        }
    }
}

fn as_bytes_bound(bound: &Bound<Slice>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(s) => Bound::Included(s.as_ref()),
        Bound::Excluded(s) => Bound::Excluded(s.as_ref()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl Iterator for MemoryRangeIter {
    type Item = crate::Result<(Slice, Slice)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.chunk.len() {
            if self.exhausted {
                return None;
            }
            self.refill();
        }

        let pair = self.chunk.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(pair))
    }
}
