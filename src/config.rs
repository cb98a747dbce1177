// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    key::MAX_NAME_LEN,
    store::Store,
    version::{Width, MAX_WIDTH},
    Slice, Tree,
};
use std::sync::Arc;

/// Invalid tree configuration
#[derive(Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The tree name is empty
    EmptyName,

    /// The tree name exceeds 254 bytes
    NameTooLong,

    /// `v_size` is outside `0..=6`
    VSizeOutOfRange,

    /// `i_size` is outside `0..=6`
    ISizeOutOfRange,

    /// The local perspective tag is empty or exceeds 254 bytes
    BadPerspective,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "name must not be empty"),
            Self::NameTooLong => write!(f, "name must not exceed 254 bytes"),
            Self::VSizeOutOfRange => write!(f, "v_size must be between 0 and 6"),
            Self::ISizeOutOfRange => write!(f, "i_size must be between 0 and 6"),
            Self::BadPerspective => {
                write!(f, "perspective must be between 1 and 254 bytes")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Tree configuration builder
///
/// ```
/// use vtree::{Config, MemoryStore};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let tree = Config::new("people").v_size(3).open(store)?;
/// # Ok::<(), vtree::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Tree name; every persisted key is prefixed by it
    pub name: String,

    /// Version identifier width in bytes (0..=6)
    pub v_size: Width,

    /// Insertion counter width in bytes (0..=6)
    pub i_size: Width,

    /// Disable all write validation (enables `del`; test and repair only)
    pub skip_validation: bool,

    /// Local perspective: items tagged with it validate like untagged ones
    pub perspective: Option<Slice>,

    /// Write buffer backpressure threshold, in outstanding items
    pub high_water_mark: usize,

    /// Drain fires when the buffer falls below this many outstanding items
    pub low_water_mark: usize,
}

impl Config {
    /// Initializes a new config for a tree name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            v_size: MAX_WIDTH,
            i_size: MAX_WIDTH,
            skip_validation: false,
            perspective: None,
            high_water_mark: 16,
            low_water_mark: 1,
        }
    }

    /// Sets the version identifier width in bytes.
    ///
    /// Fixed at tree creation; default = 6.
    #[must_use]
    pub fn v_size(mut self, width: Width) -> Self {
        self.v_size = width;
        self
    }

    /// Sets the insertion counter width in bytes.
    ///
    /// Fixed at tree creation; default = 6.
    #[must_use]
    pub fn i_size(mut self, width: Width) -> Self {
        self.i_size = width;
        self
    }

    /// Disables write validation entirely, which also enables `del`.
    ///
    /// Intended for tests and repair tooling; a tree opened this way accepts
    /// disconnected and duplicate versions verbatim.
    #[must_use]
    pub fn skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    /// Sets the local perspective tag.
    ///
    /// Items tagged with any *other* perspective bypass DAG validation and
    /// are stored as received.
    #[must_use]
    pub fn perspective(mut self, us: impl Into<Slice>) -> Self {
        self.perspective = Some(us.into());
        self
    }

    /// Sets the write buffer backpressure threshold.
    ///
    /// `write` returns `false` once this many items are outstanding.
    /// Default = 16.
    #[must_use]
    pub fn high_water_mark(mut self, items: usize) -> Self {
        self.high_water_mark = items;
        self
    }

    /// Validates the configuration.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(ConfigError::NameTooLong);
        }
        if self.v_size > MAX_WIDTH {
            return Err(ConfigError::VSizeOutOfRange);
        }
        if self.i_size > MAX_WIDTH {
            return Err(ConfigError::ISizeOutOfRange);
        }
        if let Some(us) = &self.perspective {
            if us.is_empty() || us.len() > MAX_NAME_LEN {
                return Err(ConfigError::BadPerspective);
            }
        }

        Ok(())
    }

    /// Opens the tree on top of the given store.
    ///
    /// Scans the insertion index once to recover the highest committed
    /// insertion counter.
    pub fn open<S: Store>(self, store: Arc<S>) -> crate::Result<Tree<S>> {
        Tree::open(store, self)
    }
}
