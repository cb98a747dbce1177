// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::write_buffer::{Pending, WriteBuffer};
use crate::{
    coding::Encode,
    config::Config,
    key::{parse_key, HeadVal, Keyspace, ParsedKind},
    range::us_key_range,
    store::{Batch, Direction, Store},
    version::Version,
    Error, Slice,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Condvar, Mutex,
};

/// State guarded by the buffer lock
pub(crate) struct Shared {
    pub buffer: WriteBuffer,

    /// Next insertion counter to hand out (1-based)
    pub next_i: u64,

    /// `end` was called; no further writes are accepted
    pub closed: bool,

    /// A storage error aborted the committer
    pub poisoned: bool,
}

/// Everything the committer thread and the public handle share
pub(crate) struct Core<S: Store> {
    pub store: Arc<S>,
    pub keyspace: Keyspace,
    pub config: Config,

    pub shared: Mutex<Shared>,

    /// Signals the committer that work or shutdown is pending
    pub work: Condvar,

    /// Signals writers that a buffer slot was released
    pub drained: Condvar,

    /// Highest committed insertion counter; stream snapshots read this
    pub committed_i: AtomicU64,
}

impl<S: Store> Core<S> {
    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    pub fn lock_shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().expect("lock poisoned")
    }

    /// Committer thread body: drains the buffer in FIFO order, one atomic
    /// batch per slot, until closed or poisoned.
    pub fn run_committer(&self) {
        loop {
            let pending = {
                let mut shared = self.lock_shared();

                loop {
                    if shared.poisoned {
                        return;
                    }

                    if let Some(front) = shared.buffer.front() {
                        break front.clone();
                    }

                    if shared.closed {
                        log::debug!("committer for {:?} shutting down", self.config.name);
                        self.drained.notify_all();
                        return;
                    }

                    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
                    {
                        shared = self.work.wait(shared).expect("lock poisoned");
                    }
                }
            };

            let result = self.commit(&pending);

            let mut shared = self.lock_shared();
            match result {
                Ok(committed) => {
                    shared.buffer.release_front();

                    if let Some(i) = committed {
                        self.committed_i.store(i, Ordering::Release);
                    }
                }
                Err(e) => {
                    log::error!(
                        "committer for {:?} failed, poisoning tree: {e}",
                        self.config.name
                    );
                    shared.poisoned = true;
                    shared.buffer.clear();
                    self.drained.notify_all();
                    return;
                }
            }
            drop(shared);

            self.drained.notify_all();
        }
    }

    /// Builds and applies the atomic batch for one buffer slot.
    ///
    /// Returns the committed insertion counter when an item was persisted.
    fn commit(&self, pending: &Pending) -> crate::Result<Option<u64>> {
        let ks = &self.keyspace;

        match pending {
            Pending::Insert(item) => {
                let h = &item.header;

                // stamped when the slot was reserved
                let Some(i) = h.i else {
                    return Err(Error::Unrecoverable);
                };

                let ds_key = ks.ds_key(&h.id, i);
                let head_key = ks.head_key(&h.id, &h.version);

                let mut batch = Batch::new();
                batch.put(ds_key.clone(), item.encode_into_vec());
                batch.put(ks.i_key(i), head_key.clone());
                batch.put(ks.v_key(&h.version), ds_key);
                batch.put(
                    head_key,
                    HeadVal {
                        conflict: h.conflict,
                        deleted: h.deleted,
                        i,
                    }
                    .compose(ks.i_size()),
                );

                // a child now exists, so the parents are no longer heads
                for parent in &h.parents {
                    batch.delete(ks.head_key(&h.id, parent));
                }

                if let Some(us) = &h.perspective {
                    self.stage_marker(&mut batch, us, &h.version, i)?;
                }

                self.store.apply(batch)?;
                log::trace!("committed item {} at i={i}", h.version);

                Ok(Some(i))
            }

            Pending::Marker { us, v, i } => {
                let mut batch = Batch::new();
                self.stage_marker(&mut batch, us, v, *i)?;

                if batch.is_empty() {
                    return Ok(None);
                }

                self.store.apply(batch)?;
                log::trace!("advanced perspective marker to i={i}");

                Ok(None)
            }
        }
    }

    /// Stages the monotone perspective marker upsert: the marker only moves
    /// to a strictly higher insertion counter, and at most one entry per
    /// perspective is kept.
    fn stage_marker(
        &self,
        batch: &mut Batch,
        us: &Slice,
        v: &Version,
        i: u64,
    ) -> crate::Result<()> {
        let ks = &self.keyspace;
        let range = us_key_range(ks, Some(us.as_ref()));

        if let Some((key, _)) =
            self.store
                .first_in_range(&range.start, &range.end, Direction::Reverse)?
        {
            let ParsedKind::Perspective { i: prev_i, .. } = parse_key(&key)?.kind else {
                return Err(Error::Unrecoverable);
            };

            if prev_i >= i {
                return Ok(());
            }

            batch.delete(key);
        }

        batch.put(ks.us_key(us, i), ks.us_val(v));
        Ok(())
    }
}
