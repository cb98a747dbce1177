// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{item::Item, version::Version, Slice};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// A queued unit of work for the committer
#[derive(Clone)]
pub(crate) enum Pending {
    /// Persist a validated item (insertion counter already stamped)
    Insert(Arc<Item>),

    /// Only advance the perspective marker: an already stored version was
    /// re-sent by a remote source
    Marker {
        /// Perspective tag
        us: Slice,
        /// Version the marker points at
        v: Version,
        /// Insertion counter of the already stored item
        i: u64,
    },
}

/// In-flight write buffer: a FIFO queue plus lookaside indexes
///
/// Items stay buffered until their batch commits, so validation of later
/// writes can resolve parents and duplicates against work that is not yet
/// persisted. One slot is released per committed batch.
#[derive(Default)]
pub(crate) struct WriteBuffer {
    queue: VecDeque<Pending>,

    /// Version bytes -> buffered item
    by_version: FxHashMap<Slice, Arc<Item>>,

    /// Document id -> buffered items, in queue order
    by_id: FxHashMap<Slice, Vec<Arc<Item>>>,
}

impl WriteBuffer {
    /// Number of outstanding (unreleased) entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Enqueues a validated item.
    pub fn push_insert(&mut self, item: Arc<Item>) {
        let v = Slice::from(item.header.version.as_bytes());

        self.by_version.insert(v, item.clone());
        self.by_id
            .entry(item.header.id.clone())
            .or_default()
            .push(item.clone());
        self.queue.push_back(Pending::Insert(item));
    }

    /// Enqueues a perspective marker advance.
    pub fn push_marker(&mut self, us: Slice, v: Version, i: u64) {
        self.queue.push_back(Pending::Marker { us, v, i });
    }

    /// The entry the committer should process next.
    pub fn front(&self) -> Option<&Pending> {
        self.queue.front()
    }

    /// Releases the front slot after its batch committed.
    pub fn release_front(&mut self) {
        let Some(front) = self.queue.pop_front() else {
            return;
        };

        if let Pending::Insert(item) = front {
            self.by_version.remove(item.header.version.as_bytes());

            if let Some(items) = self.by_id.get_mut(&item.header.id) {
                if let Some(pos) = items
                    .iter()
                    .position(|it| it.header.version == item.header.version)
                {
                    items.remove(pos);
                }
                if items.is_empty() {
                    self.by_id.remove(&item.header.id);
                }
            }
        }
    }

    /// Drops all queued work (used when a storage error poisons the tree).
    pub fn clear(&mut self) {
        self.queue.clear();
        self.by_version.clear();
        self.by_id.clear();
    }

    /// Whether a buffered item carries this version.
    pub fn contains_version(&self, v: &[u8]) -> bool {
        self.by_version.contains_key(v)
    }

    /// Whether any buffered item belongs to this id.
    pub fn contains_id(&self, id: &[u8]) -> bool {
        self.by_id.contains_key(id)
    }

    /// Buffered item for a version, if any.
    pub fn get_by_version(&self, v: &[u8]) -> Option<&Arc<Item>> {
        self.by_version.get(v)
    }

    /// Buffered items of an id, in queue order.
    pub fn items_for_id(&self, id: &[u8]) -> &[Arc<Item>] {
        self.by_id.get(id).map(Vec::as_slice).unwrap_or_default()
    }
}
