#![allow(dead_code)]

use std::sync::{Arc, Condvar, Mutex};
use vtree::{Batch, Config, Direction, Item, MemoryStore, RangeIter, Slice, Store, Tree, Version};

/// Trees in these suites use 3-byte versions ("Aaaa"-style base64 ids).
pub const V_SIZE: u8 = 3;

#[must_use]
pub fn v(s: &str) -> Version {
    Version::from_base64(s, V_SIZE).unwrap()
}

#[must_use]
pub fn vn(n: u64) -> Version {
    Version::from_u64(n, V_SIZE).unwrap()
}

#[must_use]
pub fn item(id: &str, version: &str) -> Item {
    Item::new(id, v(version))
}

#[must_use]
pub fn open_tree(name: &str) -> Tree<MemoryStore> {
    Config::new(name)
        .v_size(V_SIZE)
        .open(Arc::new(MemoryStore::new()))
        .unwrap()
}

#[must_use]
pub fn open_tree_on(store: Arc<MemoryStore>, name: &str) -> Tree<MemoryStore> {
    Config::new(name).v_size(V_SIZE).open(store).unwrap()
}

/// A store whose batch commits can be held back behind a gate.
///
/// Lets tests pile up outstanding items in the write buffer
/// deterministically: while the gate is closed, the committer blocks on its
/// first `apply` and every written item stays buffered.
pub struct GateStore {
    inner: MemoryStore,
    open: Mutex<bool>,
    cv: Condvar,
}

impl GateStore {
    #[must_use]
    pub fn closed() -> Self {
        Self {
            inner: MemoryStore::new(),
            open: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn open_gate(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait_gate(&self) {
        let open = self.open.lock().unwrap();
        // bounded, so a failing test cannot hang the committer forever
        let (guard, _) = self
            .cv
            .wait_timeout_while(open, std::time::Duration::from_secs(10), |open| !*open)
            .unwrap();
        drop(guard);
    }
}

impl Store for GateStore {
    fn get(&self, key: &[u8]) -> vtree::Result<Option<Slice>> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> vtree::Result<()> {
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> vtree::Result<()> {
        self.inner.delete(key)
    }

    fn apply(&self, batch: Batch) -> vtree::Result<()> {
        self.wait_gate();
        self.inner.apply(batch)
    }

    fn range(&self, start: &[u8], end: &[u8], direction: Direction) -> RangeIter {
        self.inner.range(start, end, direction)
    }
}

/// A store whose batch commits fail on demand, for poisoning tests.
pub struct FailingStore {
    inner: MemoryStore,
    fail: Mutex<bool>,
}

impl FailingStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail: Mutex::new(false),
        }
    }

    pub fn fail_applies(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

impl Store for FailingStore {
    fn get(&self, key: &[u8]) -> vtree::Result<Option<Slice>> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> vtree::Result<()> {
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> vtree::Result<()> {
        self.inner.delete(key)
    }

    fn apply(&self, batch: Batch) -> vtree::Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(vtree::Error::Io(std::io::Error::other("gate failure")));
        }
        self.inner.apply(batch)
    }

    fn range(&self, start: &[u8], end: &[u8], direction: Direction) -> RangeIter {
        self.inner.range(start, end, direction)
    }
}
