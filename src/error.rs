// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{DecodeError, EncodeError},
    config::ConfigError,
    version::{Version, VersionError},
};

/// Represents errors that can occur in the versioned tree store
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// Invalid tree configuration
    Config(ConfigError),

    /// Malformed version identifier
    Version(VersionError),

    /// The item was rejected by the write pipeline: structural mismatch,
    /// duplicate version, unknown parents, or a second root next to a
    /// non-deleted head
    NotValidNewItem {
        /// Parent versions that could not be resolved to an existing version
        /// of the same id (empty when the rejection was not parent-related)
        problem_parents: Vec<Version>,
    },

    /// The requested version does not exist in this tree
    VersionNotFound,

    /// `del` was called on a validating tree
    DelNeedsSkipValidation,

    /// The tree input was closed by `end`
    Closed,

    /// A storage error aborted the committer; the tree no longer accepts writes
    Poisoned,

    /// Invalid stream option combination
    InvalidStreamOptions(&'static str),

    /// The insertion counter no longer fits into the configured `i_size`
    CounterExhausted,

    /// An index entry points at data that does not exist or does not parse;
    /// the store content is damaged
    Unrecoverable,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Encode(e) => write!(f, "{e}"),
            Self::Decode(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::Version(e) => write!(f, "{e}"),
            Self::NotValidNewItem { .. } => write!(f, "not a valid new item"),
            Self::VersionNotFound => write!(f, "version not found"),
            Self::DelNeedsSkipValidation => {
                write!(f, "del is only available if skip_validation is set to true")
            }
            Self::Closed => write!(f, "tree is closed"),
            Self::Poisoned => write!(f, "tree is poisoned"),
            Self::InvalidStreamOptions(what) => write!(f, "{what}"),
            Self::CounterExhausted => write!(f, "insertion counter exhausted"),
            Self::Unrecoverable => write!(f, "store content is unrecoverable"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Version(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<VersionError> for Error {
    fn from(value: VersionError) -> Self {
        Self::Version(value)
    }
}

/// Tree result
pub type Result<T> = std::result::Result<T, Error>;
