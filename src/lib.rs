// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A versioned-document tree store: an append-only, content-addressed DAG of
//! item versions persisted atop an ordered key-value store.
//!
//! ##### About
//!
//! Each logical document (identified by an application-supplied id) evolves
//! as a DAG of versions, where every new version names its parent version(s).
//! Five secondary indexes are multiplexed into one ordered KV namespace and
//! maintained atomically per write: the data store itself, an insertion
//! index, a head index, a version index and per-perspective markers.
//!
//! The tree exposes the DAG as an insertion-ordered stream (optionally
//! tailing the live tree), per-id streams, the set of current heads,
//! version lookup and "last seen" markers per external source.
//!
//! Storage is pluggable through the [`Store`] trait; an in-memory
//! implementation backed by a lock-free skiplist ships with the crate.
//!
//! # Example usage
//!
//! ```
//! use vtree::{Config, Item, MemoryStore, Version};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let tree = Config::new("people").v_size(3).open(store)?;
//!
//! let root = Version::from_base64("Aaaa", 3)?;
//! let child = Version::from_base64("Bbbb", 3)?;
//!
//! tree.write(Item::new("jane", root.clone()).body(b"v1".to_vec()))?;
//! tree.write(Item::new("jane", child.clone()).parent(root).body(b"v2".to_vec()))?;
//! tree.drain()?;
//!
//! assert_eq!(vec![child.clone()], tree.get_head_versions(b"jane")?);
//!
//! let item = tree.get_by_version(&child)?.expect("was written");
//! assert_eq!(Some(2), item.header.i);
//! #
//! # Ok::<(), vtree::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

pub mod coding;
mod config;
mod error;
mod item;

#[doc(hidden)]
pub mod key;

#[doc(hidden)]
pub mod range;

mod slice;
mod store;
mod tree;
mod version;

pub use {
    coding::{Decode, DecodeError, Encode, EncodeError},
    config::{Config, ConfigError},
    error::{Error, Result},
    item::{Item, ItemHeader},
    key::{parse_key, HeadVal, Keyspace, ParsedKey, ParsedKind, SubkeyType},
    range::KeyRange,
    slice::Slice,
    store::{Batch, BatchOp, Direction, MemoryStore, RangeIter, Store},
    tree::{
        heads::{HeadStats, HeadStream, HeadStreamOpts, Stats},
        stream::{Closer, ReadStream, ReadStreamOpts, StreamEntry, DEFAULT_TAIL_RETRY},
        Tree,
    },
    version::{Version, VersionError, Width},
};
