// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::inner::Core;
use crate::{
    item::Item,
    key::{parse_key, HeadVal, ParsedKind},
    range::head_key_range,
    store::{Direction, Store},
    Error, Slice,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Options for [`crate::Tree::heads`]
#[derive(Clone, Debug, Default)]
pub struct HeadStreamOpts {
    /// Skip heads flagged as being in conflict
    pub skip_conflicts: bool,

    /// Skip heads that are deletions
    pub skip_deletes: bool,

    /// Only emit heads of this document id
    pub id: Option<Slice>,
}

impl HeadStreamOpts {
    /// Creates default options: all heads of the tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips heads flagged as being in conflict.
    #[must_use]
    pub fn skip_conflicts(mut self) -> Self {
        self.skip_conflicts = true;
        self
    }

    /// Skips heads that are deletions.
    #[must_use]
    pub fn skip_deletes(mut self) -> Self {
        self.skip_deletes = true;
        self
    }

    /// Restricts emission to one document id.
    #[must_use]
    pub fn id(mut self, id: impl Into<Slice>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Head counters, aggregated over the head index
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeadStats {
    /// Number of head entries
    pub count: u64,

    /// Number of heads flagged as being in conflict
    pub conflict: u64,

    /// Number of heads that are deletions
    pub deleted: u64,
}

/// Tree statistics
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Head counters
    pub heads: HeadStats,
}

/// Stream over the current heads of the tree
///
/// Emits in ascending id order (key order of the head index), then ascending
/// insertion order within an id. One id group is buffered at a time.
pub struct HeadStream<S: Store> {
    core: Arc<Core<S>>,
    iter: crate::store::RangeIter,
    opts: HeadStreamOpts,

    /// First entry of the next id group, already pulled from the iterator
    lookahead: Option<(Slice, HeadVal)>,

    /// Remaining entries of the current id group, ordered by `i`
    group: VecDeque<(Slice, HeadVal)>,

    done: bool,
}

impl<S: Store> HeadStream<S> {
    pub(crate) fn open(core: Arc<Core<S>>, opts: HeadStreamOpts) -> Self {
        let range = head_key_range(&core.keyspace, opts.id.as_deref());
        let iter = core.store.range(&range.start, &range.end, Direction::Forward);

        Self {
            iter,
            opts,
            lookahead: None,
            group: VecDeque::new(),
            done: false,
            core,
        }
    }

    /// Pulls the next raw head entry as `(id, head value)`.
    fn pull(&mut self) -> crate::Result<Option<(Slice, HeadVal)>> {
        let Some(pair) = self.iter.next() else {
            return Ok(None);
        };
        let (key, value) = pair?;

        let ParsedKind::Head { id, .. } = parse_key(&key)?.kind else {
            return Err(Error::Unrecoverable);
        };

        Ok(Some((id, HeadVal::parse(&value)?)))
    }

    /// Buffers the next id group, ordered by insertion counter.
    fn fill_group(&mut self) -> crate::Result<bool> {
        let first = match self.lookahead.take() {
            Some(entry) => entry,
            None => match self.pull()? {
                Some(entry) => entry,
                None => return Ok(false),
            },
        };

        let id = first.0.clone();
        let mut entries = vec![first];

        loop {
            match self.pull()? {
                Some(entry) if entry.0 == id => entries.push(entry),
                Some(entry) => {
                    self.lookahead = Some(entry);
                    break;
                }
                None => break,
            }
        }

        entries.sort_by_key(|(_, head_val)| head_val.i);
        self.group = entries.into();

        Ok(true)
    }

    fn fetch_item(&self, id: &Slice, head_val: &HeadVal) -> crate::Result<Item> {
        let ds_key = self.core.keyspace.ds_key(id, head_val.i);
        let Some(record) = self.core.store.get(&ds_key)? else {
            return Err(Error::Unrecoverable);
        };

        Item::from_record(&record).map_err(Error::from)
    }
}

impl<S: Store> Iterator for HeadStream<S> {
    type Item = crate::Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let Some((id, head_val)) = self.group.pop_front() else {
                match self.fill_group() {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.done = true;
                        return None;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            };

            if self.opts.skip_conflicts && head_val.conflict {
                continue;
            }
            if self.opts.skip_deletes && head_val.deleted {
                continue;
            }

            match self.fetch_item(&id, &head_val) {
                Ok(item) => return Some(Ok(item)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
