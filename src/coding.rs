// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Serialization traits and their error types

use std::io::{Read, Write};

/// Error during serialization
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodeError({})",
            match self {
                Self::Io(e) => e.to_string(),
            }
        )
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

/// Error during deserialization
///
/// Key and record parsers are strict: any leftover or missing byte is an
/// error, never a silent truncation.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),

    /// The subkey type byte is not one of the five known indexes
    UnknownKeyType(u8),

    /// A length-prefixed string (name, id) was not followed by its null byte
    MissingNullByte(&'static str),

    /// A length-prefixed field (`i`, `v`, `us`) declared zero bytes
    EmptyField(&'static str),

    /// A declared length points past the end of the buffer,
    /// or bytes remain after the last field
    OutOfRange,

    /// Invalid enum tag or flag bits, e.g. unknown head flags
    InvalidTag((&'static str, u8)),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::UnknownKeyType(_) => write!(f, "key is of an unknown type"),
            Self::MissingNullByte(what) => write!(f, "expected a null byte after {what}"),
            Self::EmptyField(field) => write!(f, "{field} must be at least one byte"),
            Self::OutOfRange => write!(f, "index out of range"),
            Self::InvalidTag((name, tag)) => write!(f, "invalid tag for {name}: {tag}"),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {}

/// Trait to serialize stuff
pub trait Encode {
    /// Serializes into writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into vector.
    #[must_use]
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("cannot fail");
        v
    }
}

/// Trait to deserialize stuff
pub trait Decode {
    /// Deserializes from reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}
