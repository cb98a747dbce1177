// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::inner::Core;
use crate::{
    item::Item,
    key::{parse_key, ParsedKind},
    range::i_key_range,
    store::{Direction, Store},
    version::Version,
    Error, Slice,
};
use std::sync::{atomic::Ordering, Arc, Condvar, Mutex};
use std::time::Duration;

/// Default tail poll interval
pub const DEFAULT_TAIL_RETRY: Duration = Duration::from_millis(1000);

/// Cancellation handle for a stream
///
/// Cloneable and callable from any thread; `close` wakes a tailing stream
/// out of its poll sleep. After `close` returns, the stream delivers no
/// further items.
#[derive(Clone, Debug, Default)]
pub struct Closer(Arc<CloserInner>);

#[derive(Debug, Default)]
struct CloserInner {
    closed: Mutex<bool>,
    cv: Condvar,
}

impl Closer {
    /// Closes the associated stream.
    pub fn close(&self) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut closed = self.0.closed.lock().expect("lock poisoned");
        *closed = true;
        self.0.cv.notify_all();
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let closed = self.0.closed.lock().expect("lock poisoned");
        *closed
    }

    /// Sleeps up to `timeout`, waking early on `close`.
    ///
    /// Returns whether the closer fired.
    pub(crate) fn sleep(&self, timeout: Duration) -> bool {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let closed = self.0.closed.lock().expect("lock poisoned");

        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let (closed, _) = self
            .0
            .cv
            .wait_timeout_while(closed, timeout, |closed| !*closed)
            .expect("lock poisoned");

        *closed
    }
}

/// Options for [`crate::Tree::read_stream`]
#[derive(Clone, Debug, Default)]
pub struct ReadStreamOpts {
    /// Start emission at this version (by its insertion counter)
    pub first: Option<Version>,

    /// Shift the lower bound one position past `first`
    pub exclude_first: bool,

    /// Stop emission at this version (by its insertion counter)
    pub last: Option<Version>,

    /// Shift the upper bound one position before `last`
    pub exclude_last: bool,

    /// Only emit items of this document id
    pub id: Option<Slice>,

    /// Emit in descending insertion order (mutually exclusive with `tail`)
    pub reverse: bool,

    /// Keep polling for new items after the current range is exhausted
    pub tail: bool,

    /// Poll interval in tail mode; default 1000 ms
    pub tail_retry: Option<Duration>,

    /// Skip record decoding and only hand out the stored bytes
    pub raw: bool,
}

impl ReadStreamOpts {
    /// Creates default options: full insertion order, decoded items.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts emission at `v`.
    #[must_use]
    pub fn first(mut self, v: Version) -> Self {
        self.first = Some(v);
        self
    }

    /// Excludes `first` itself from emission.
    #[must_use]
    pub fn exclude_first(mut self) -> Self {
        self.exclude_first = true;
        self
    }

    /// Stops emission at `v` (inclusive).
    #[must_use]
    pub fn last(mut self, v: Version) -> Self {
        self.last = Some(v);
        self
    }

    /// Excludes `last` itself from emission.
    #[must_use]
    pub fn exclude_last(mut self) -> Self {
        self.exclude_last = true;
        self
    }

    /// Restricts emission to one document id.
    #[must_use]
    pub fn id(mut self, id: impl Into<Slice>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Emits in descending insertion order.
    #[must_use]
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Follows the tree: polls for new items instead of ending.
    #[must_use]
    pub fn tail(mut self) -> Self {
        self.tail = true;
        self
    }

    /// Sets the tail poll interval.
    #[must_use]
    pub fn tail_retry(mut self, interval: Duration) -> Self {
        self.tail_retry = Some(interval);
        self
    }

    /// Skips record decoding.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }
}

/// One emitted stream element
#[derive(Clone, Debug)]
pub struct StreamEntry {
    /// Decoded item; absent in raw mode
    pub item: Option<Item>,

    /// Stored record bytes
    pub record: Slice,
}

impl StreamEntry {
    /// Consumes the entry into its decoded item.
    #[must_use]
    pub fn into_item(self) -> Option<Item> {
        self.item
    }
}

/// Stream over items in insertion order
///
/// Takes a logical snapshot at creation: items committed later are not
/// emitted unless `tail` was set. Pull-based, so consumer backpressure is
/// structural.
pub struct ReadStream<S: Store> {
    core: Arc<Core<S>>,
    iter: crate::store::RangeIter,
    direction: Direction,

    id_filter: Option<Slice>,

    /// Inclusive upper bound for tail requeries (`None` = follow forever)
    upper: Option<u64>,

    tail: bool,
    tail_retry: Duration,
    raw: bool,

    /// Highest insertion counter visited, next tail requery starts past it
    last_i: u64,

    emitted: u64,
    done: bool,
    closer: Closer,
}

impl<S: Store> ReadStream<S> {
    pub(crate) fn open(core: Arc<Core<S>>, opts: ReadStreamOpts) -> crate::Result<Self> {
        if opts.tail && opts.reverse {
            return Err(Error::InvalidStreamOptions(
                "tail and reverse are mutually exclusive",
            ));
        }

        let snapshot = core.committed_i.load(Ordering::Acquire);

        let min_i = match &opts.first {
            Some(v) => {
                let i = resolve_version_i(&core, v)?;
                if opts.exclude_first {
                    i + 1
                } else {
                    i
                }
            }
            None => 1,
        };

        let user_max = match &opts.last {
            Some(v) => {
                let i = resolve_version_i(&core, v)?;
                Some(if opts.exclude_last { i.saturating_sub(1) } else { i })
            }
            None => None,
        };

        let upper = if opts.tail {
            user_max
        } else {
            Some(user_max.map_or(snapshot, |m| m.min(snapshot)))
        };

        let range = i_key_range(&core.keyspace, Some(min_i), upper);
        let direction = if opts.reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        let iter = core.store.range(&range.start, &range.end, direction);

        Ok(Self {
            iter,
            direction,
            id_filter: opts.id,
            upper,
            tail: opts.tail,
            tail_retry: opts.tail_retry.unwrap_or(DEFAULT_TAIL_RETRY),
            raw: opts.raw,
            last_i: min_i.saturating_sub(1),
            emitted: 0,
            done: false,
            closer: Closer::default(),
            core,
        })
    }

    /// Returns a cancellation handle for this stream.
    #[must_use]
    pub fn closer(&self) -> Closer {
        self.closer.clone()
    }

    /// Closes the stream; no further items are delivered.
    pub fn close(&self) {
        self.closer.close();
    }

    /// Number of items delivered so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn lookup(&self, i: u64, head_key: &[u8]) -> crate::Result<Option<StreamEntry>> {
        let ParsedKind::Head { id, .. } = parse_key(head_key)?.kind else {
            return Err(Error::Unrecoverable);
        };

        if let Some(filter) = &self.id_filter {
            if id != *filter {
                return Ok(None);
            }
        }

        let ds_key = self.core.keyspace.ds_key(&id, i);
        let Some(record) = self.core.store.get(&ds_key)? else {
            return Err(Error::Unrecoverable);
        };

        let item = if self.raw {
            None
        } else {
            Some(Item::from_record(&record)?)
        };

        Ok(Some(StreamEntry { item, record }))
    }
}

impl<S: Store> Iterator for ReadStream<S> {
    type Item = crate::Result<StreamEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.closer.is_closed() {
            self.done = true;
            return None;
        }

        loop {
            match self.iter.next() {
                Some(Ok((i_key, head_key))) => {
                    let i = match parse_key(&i_key) {
                        Ok(parsed) => match parsed.kind {
                            ParsedKind::Insertion { i } => i,
                            _ => {
                                self.done = true;
                                return Some(Err(Error::Unrecoverable));
                            }
                        },
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e.into()));
                        }
                    };

                    if self.direction == Direction::Forward {
                        self.last_i = i;
                    }

                    match self.lookup(i, &head_key) {
                        Ok(Some(entry)) => {
                            self.emitted += 1;
                            return Some(Ok(entry));
                        }
                        Ok(None) => {} // id filter mismatch
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }

                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }

                None => {
                    if !self.tail {
                        self.done = true;
                        return None;
                    }

                    if self.closer.sleep(self.tail_retry) {
                        self.done = true;
                        return None;
                    }

                    let range =
                        i_key_range(&self.core.keyspace, Some(self.last_i + 1), self.upper);
                    self.iter =
                        self.core
                            .store
                            .range(&range.start, &range.end, Direction::Forward);
                }
            }
        }
    }
}

/// Maps a version to its insertion counter through the version index.
fn resolve_version_i<S: Store>(core: &Core<S>, v: &Version) -> crate::Result<u64> {
    let Some(ds_key) = core.store.get(&core.keyspace.v_key(v))? else {
        return Err(Error::VersionNotFound);
    };

    match parse_key(&ds_key)?.kind {
        ParsedKind::Data { i, .. } => Ok(i),
        _ => Err(Error::Unrecoverable),
    }
}
