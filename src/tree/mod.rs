// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub(crate) mod heads;
pub(crate) mod inner;
pub(crate) mod stream;
pub(crate) mod validate;
pub(crate) mod write_buffer;

use self::{
    heads::{HeadStats, HeadStream, HeadStreamOpts, Stats},
    inner::{Core, Shared},
    stream::{ReadStream, ReadStreamOpts},
    validate::Outcome,
    write_buffer::WriteBuffer,
};
use crate::{
    config::Config,
    item::Item,
    key::{fits_width, parse_key, HeadVal, Keyspace, ParsedKind},
    range::{self, KeyRange},
    store::{Batch, Direction, Store},
    version::Version,
    Error, MemoryStore, Slice,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Condvar, Mutex,
};
use std::thread::JoinHandle;

/// A versioned-document tree: an append-only DAG of item versions
///
/// Each logical document, identified by an application-supplied id, evolves
/// as a DAG of versions; every new version names its parents. Five secondary
/// indexes over one ordered KV namespace expose the DAG as an
/// insertion-ordered stream, per-id streams, the current heads, version
/// lookup and per-perspective markers.
///
/// Writes are validated against the persisted indexes plus the in-flight
/// write buffer, then committed by a dedicated committer task, one atomic
/// batch per item, in call order.
///
/// Cloning the handle is cheap; all clones drive the same tree.
pub struct Tree<S: Store = MemoryStore> {
    handle: Arc<Handle<S>>,
}

impl<S: Store> Clone for Tree<S> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<S: Store> std::fmt::Debug for Tree<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree").finish_non_exhaustive()
    }
}

struct Handle<S: Store> {
    core: Arc<Core<S>>,
    committer: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Store> Drop for Handle<S> {
    fn drop(&mut self) {
        {
            let mut shared = self.core.lock_shared();
            shared.closed = true;
        }
        self.core.work.notify_all();

        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let handle = self.committer.lock().expect("lock poisoned").take();

        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl<S: Store> Tree<S> {
    /// Opens a tree; use [`Config::open`].
    pub(crate) fn open(store: Arc<S>, config: Config) -> crate::Result<Self> {
        config.validate()?;

        let keyspace = Keyspace::new(&config.name, config.v_size, config.i_size);

        // recover the highest committed insertion counter
        let range = range::i_key_range(&keyspace, None, None);
        let max_i = match store.first_in_range(&range.start, &range.end, Direction::Reverse)? {
            Some((key, _)) => match parse_key(&key)?.kind {
                ParsedKind::Insertion { i } => i,
                _ => return Err(Error::Unrecoverable),
            },
            None => 0,
        };

        log::debug!("opened tree {:?} at i={max_i}", config.name);

        let core = Arc::new(Core {
            store,
            keyspace,
            config,
            shared: Mutex::new(Shared {
                buffer: WriteBuffer::default(),
                next_i: max_i + 1,
                closed: false,
                poisoned: false,
            }),
            work: Condvar::new(),
            drained: Condvar::new(),
            committed_i: AtomicU64::new(max_i),
        });

        let committer = {
            let core = core.clone();
            std::thread::Builder::new()
                .name(format!("vtree-commit-{}", core.config.name))
                .spawn(move || core.run_committer())?
        };

        Ok(Self {
            handle: Arc::new(Handle {
                core,
                committer: Mutex::new(Some(committer)),
            }),
        })
    }

    fn core(&self) -> &Arc<Core<S>> {
        &self.handle.core
    }

    /// The tree name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core().config.name
    }

    /// Enqueues an item for insertion.
    ///
    /// The item is validated synchronously against the store and the write
    /// buffer, then committed in call order by the committer task. Returns
    /// `false` once the buffer holds at least `high_water_mark` outstanding
    /// items; callers should then [`Tree::drain`] before writing more.
    pub fn write(&self, item: Item) -> crate::Result<bool> {
        let core = self.core();
        let mut shared = core.lock_shared();

        if shared.poisoned {
            return Err(Error::Poisoned);
        }
        if shared.closed {
            return Err(Error::Closed);
        }

        let outcome = validate::validate_new_item(
            &item,
            &shared.buffer,
            &*core.store,
            &core.keyspace,
            core.config.perspective.as_ref(),
            core.config.skip_validation,
        )?;

        match outcome {
            Outcome::Insert { parents } => {
                if !fits_width(shared.next_i, core.keyspace.i_size()) {
                    return Err(Error::CounterExhausted);
                }

                let mut item = item;
                item.header.parents = parents;
                item.header.i = Some(shared.next_i);
                shared.next_i += 1;

                shared.buffer.push_insert(Arc::new(item));
            }
            Outcome::Marker { us, v, i } => {
                shared.buffer.push_marker(us, v, i);
            }
        }

        let below_high_water = shared.buffer.len() < core.config.high_water_mark;
        drop(shared);

        core.work.notify_one();
        Ok(below_high_water)
    }

    /// Blocks until the write buffer has fallen below the low-water mark.
    ///
    /// With the default low-water mark of 1 this waits for all outstanding
    /// items to commit.
    pub fn drain(&self) -> crate::Result<()> {
        let core = self.core();
        let low_water = core.config.low_water_mark.max(1);

        let mut shared = core.lock_shared();
        loop {
            if shared.poisoned {
                return Err(Error::Poisoned);
            }
            if shared.buffer.len() < low_water {
                return Ok(());
            }

            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            {
                shared = core.drained.wait(shared).expect("lock poisoned");
            }
        }
    }

    /// Closes the input: flushes all outstanding items and stops the
    /// committer. Writes after `end` fail with `tree is closed`.
    pub fn end(&self) -> crate::Result<()> {
        let core = self.core();

        {
            let mut shared = core.lock_shared();
            if shared.poisoned {
                return Err(Error::Poisoned);
            }
            shared.closed = true;
        }
        core.work.notify_all();

        let mut shared = core.lock_shared();
        while !shared.buffer.is_empty() && !shared.poisoned {
            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            {
                shared = core.drained.wait(shared).expect("lock poisoned");
            }
        }
        let poisoned = shared.poisoned;
        drop(shared);

        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let handle = self.handle.committer.lock().expect("lock poisoned").take();

        if let Some(handle) = handle {
            let _ = handle.join();
        }

        if poisoned {
            Err(Error::Poisoned)
        } else {
            Ok(())
        }
    }

    /// Writes one final item, then closes the input.
    pub fn end_with(&self, item: Item) -> crate::Result<()> {
        self.write(item)?;
        self.end()
    }

    /// Removes a version's data, insertion, version and head entries.
    ///
    /// Only available on trees opened with `skip_validation`; intended for
    /// tests and repair. Callers must quiesce writes first.
    pub fn del(&self, item: &Item) -> crate::Result<()> {
        let core = self.core();

        if !core.config.skip_validation {
            return Err(Error::DelNeedsSkipValidation);
        }

        let ks = &core.keyspace;
        let v = &item.header.version;

        let Some(ds_key) = core.store.get(&ks.v_key(v))? else {
            return Err(Error::VersionNotFound);
        };
        let ParsedKind::Data { id, i } = parse_key(&ds_key)?.kind else {
            return Err(Error::Unrecoverable);
        };

        let mut batch = Batch::new();
        batch.delete(ds_key);
        batch.delete(ks.i_key(i));
        batch.delete(ks.v_key(v));
        batch.delete(ks.head_key(&id, v));

        core.store.apply(batch)
    }

    /// Returns the item stored under a version, or `None` if absent.
    pub fn get_by_version(&self, v: &Version) -> crate::Result<Option<Item>> {
        Ok(match self.get_by_version_raw(v)? {
            Some(record) => Some(Item::from_record(&record)?),
            None => None,
        })
    }

    /// Returns the raw stored record of a version, or `None` if absent.
    pub fn get_by_version_raw(&self, v: &Version) -> crate::Result<Option<Slice>> {
        let core = self.core();

        let Some(ds_key) = core.store.get(&core.keyspace.v_key(v))? else {
            return Ok(None);
        };

        match core.store.get(&ds_key)? {
            Some(record) => Ok(Some(record)),
            None => Err(Error::Unrecoverable),
        }
    }

    /// Whether a version is persisted (the write buffer is not consulted).
    pub fn contains_version(&self, v: &Version) -> crate::Result<bool> {
        Ok(self.core().store.get(&self.core().keyspace.v_key(v))?.is_some())
    }

    /// Returns the head versions of an id, in insertion order.
    pub fn get_head_versions(&self, id: &[u8]) -> crate::Result<Vec<Version>> {
        let core = self.core();
        let ks = &core.keyspace;

        let range = range::head_key_range(ks, Some(id));
        let mut heads: Vec<(u64, Version)> = vec![];

        for pair in core.store.range(&range.start, &range.end, Direction::Forward) {
            let (key, value) = pair?;

            let ParsedKind::Head { v, .. } = parse_key(&key)?.kind else {
                return Err(Error::Unrecoverable);
            };
            let head_val = HeadVal::parse(&value)?;
            let v = Version::from_slice(v, ks.v_size()).map_err(|_| Error::Unrecoverable)?;

            heads.push((head_val.i, v));
        }

        heads.sort_by_key(|(i, _)| *i);
        Ok(heads.into_iter().map(|(_, v)| v).collect())
    }

    /// Streams the current heads: ascending id, then ascending insertion
    /// order within an id.
    #[must_use]
    pub fn heads(&self, opts: HeadStreamOpts) -> HeadStream<S> {
        HeadStream::open(self.core().clone(), opts)
    }

    /// Visits the current heads until the visitor returns `Ok(false)` or the
    /// heads are exhausted.
    ///
    /// Returns the last continue flag: `false` when the visitor stopped the
    /// iteration, `true` otherwise.
    pub fn get_heads<F>(&self, opts: HeadStreamOpts, mut visit: F) -> crate::Result<bool>
    where
        F: FnMut(&Item) -> crate::Result<bool>,
    {
        for item in self.heads(opts) {
            if !visit(&item?)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Streams items in insertion order; see [`ReadStreamOpts`].
    pub fn read_stream(&self, opts: ReadStreamOpts) -> crate::Result<ReadStream<S>> {
        ReadStream::open(self.core().clone(), opts)
    }

    /// Streams items in strict ascending insertion order with
    /// snapshot-at-open semantics.
    ///
    /// Same bound options as [`Tree::read_stream`]; the id filter and
    /// reverse flag do not apply.
    pub fn insertion_order_stream(&self, opts: ReadStreamOpts) -> crate::Result<ReadStream<S>> {
        let opts = ReadStreamOpts {
            id: None,
            reverse: false,
            ..opts
        };
        ReadStream::open(self.core().clone(), opts)
    }

    /// Returns the version with the greatest insertion counter, or `None`
    /// for an empty tree.
    pub fn last_version(&self) -> crate::Result<Option<Version>> {
        let core = self.core();
        let ks = &core.keyspace;

        let range = range::i_key_range(ks, None, None);
        let Some((_, head_key)) =
            core.store
                .first_in_range(&range.start, &range.end, Direction::Reverse)?
        else {
            return Ok(None);
        };

        let ParsedKind::Head { v, .. } = parse_key(&head_key)?.kind else {
            return Err(Error::Unrecoverable);
        };

        Version::from_slice(v, ks.v_size())
            .map(Some)
            .map_err(|_| Error::Unrecoverable)
    }

    /// Returns the last version seen from a perspective, or `None` if the
    /// perspective has no marker.
    pub fn last_by_perspective(&self, us: &[u8]) -> crate::Result<Option<Version>> {
        let core = self.core();
        let ks = &core.keyspace;

        let range = range::us_key_range(ks, Some(us));
        let Some((_, value)) =
            core.store
                .first_in_range(&range.start, &range.end, Direction::Reverse)?
        else {
            return Ok(None);
        };

        let v = Keyspace::parse_us_val(&value)?;
        Version::from_slice(v, ks.v_size())
            .map(Some)
            .map_err(|_| Error::Unrecoverable)
    }

    /// Idempotently sets the conflict flag in the head entry of `v`.
    ///
    /// A no-op when `v` is not a head; fails when `v` does not exist at all.
    pub fn set_conflict_by_version(&self, v: &Version) -> crate::Result<()> {
        let core = self.core();
        let ks = &core.keyspace;

        let Some(ds_key) = core.store.get(&ks.v_key(v))? else {
            return Err(Error::VersionNotFound);
        };
        let ParsedKind::Data { id, .. } = parse_key(&ds_key)?.kind else {
            return Err(Error::Unrecoverable);
        };

        let head_key = ks.head_key(&id, v);
        let Some(value) = core.store.get(&head_key)? else {
            // not a head
            return Ok(());
        };

        let mut head_val = HeadVal::parse(&value)?;
        if head_val.conflict {
            return Ok(());
        }
        head_val.conflict = true;

        core.store.put(&head_key, &head_val.compose(ks.i_size()))
    }

    /// Aggregates head counters over the head index.
    pub fn stats(&self) -> crate::Result<Stats> {
        let core = self.core();

        let range = range::head_key_range(&core.keyspace, None);
        let mut heads = HeadStats::default();

        for pair in core.store.range(&range.start, &range.end, Direction::Forward) {
            let (_, value) = pair?;
            let head_val = HeadVal::parse(&value)?;

            heads.count += 1;
            if head_val.conflict {
                heads.conflict += 1;
            }
            if head_val.deleted {
                heads.deleted += 1;
            }
        }

        Ok(Stats { heads })
    }

    /// Whether an item of this id is currently in the write buffer.
    #[must_use]
    pub fn in_buffer_by_id(&self, id: &[u8]) -> bool {
        self.core().lock_shared().buffer.contains_id(id)
    }

    /// Whether an item with this version is currently in the write buffer.
    #[must_use]
    pub fn in_buffer_by_version(&self, v: &Version) -> bool {
        self.core().lock_shared().buffer.contains_version(v.as_bytes())
    }

    /// Approximate number of committed items (the insertion counter high
    /// mark; `del` leaves gaps behind).
    #[must_use]
    pub fn len_approx(&self) -> u64 {
        self.core().committed_i.load(Ordering::Acquire)
    }

    /// Whether the tree has never committed an item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len_approx() == 0
    }

    /// Range of all head keys of this tree.
    #[must_use]
    pub fn head_key_range(&self) -> KeyRange {
        range::head_key_range(&self.core().keyspace, None)
    }

    /// Range of data store keys, optionally bracketed to one id and an
    /// insertion counter window.
    #[must_use]
    pub fn ds_key_range(
        &self,
        id: Option<&[u8]>,
        min_i: Option<u64>,
        max_i: Option<u64>,
    ) -> KeyRange {
        range::ds_key_range(&self.core().keyspace, id, min_i, max_i)
    }

    /// Range of insertion index keys, optionally bracketed by `min_i`/`max_i`.
    #[must_use]
    pub fn i_key_range(&self, min_i: Option<u64>, max_i: Option<u64>) -> KeyRange {
        range::i_key_range(&self.core().keyspace, min_i, max_i)
    }

    /// Range of all version index keys of this tree.
    #[must_use]
    pub fn v_key_range(&self) -> KeyRange {
        range::v_key_range(&self.core().keyspace)
    }

    /// Range of perspective keys, optionally restricted to one tag.
    #[must_use]
    pub fn us_key_range(&self, us: Option<&[u8]>) -> KeyRange {
        range::us_key_range(&self.core().keyspace, us)
    }
}
