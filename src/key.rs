// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Binary key and value codec
//!
//! Five secondary indexes are multiplexed into one ordered KV namespace.
//! Every key starts with `len(name) || name || 0x00`, followed by a one-byte
//! subkey type and the type-specific suffix:
//!
//! | type | index            | suffix                                  | value          |
//! |------|------------------|-----------------------------------------|----------------|
//! | 0x01 | data store       | `len(id) || id || 0x00 || i_size || i`  | item record    |
//! | 0x02 | insertion index  | `i_size || i`                           | head key bytes |
//! | 0x03 | heads            | `len(id) || id || 0x00 || v_size || v`  | [`HeadVal`]    |
//! | 0x04 | version index    | `v_size || v`                           | data key bytes |
//! | 0x05 | perspectives     | `len(us) || us || 0x00 || i_size || i`  | `v_size || v`  |
//!
//! Integers are big-endian in exactly their declared width, so lexicographic
//! byte order matches numeric order. Parsers are strict: unknown type bytes,
//! missing null terminators, zero-width integers, lengths past the end of the
//! buffer and trailing bytes are all rejected.

use crate::{
    coding::DecodeError,
    version::{Version, Width},
    Slice,
};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};

/// Maximum tree name length in bytes (one length byte, minus the null terminator)
pub const MAX_NAME_LEN: usize = 254;

/// Maximum id / perspective tag length in bytes
///
/// Capped like tree names: the length byte must stay below `0xff` so the
/// range planner's `prefix || 0xff` upper bound covers every real key.
pub const MAX_ID_LEN: usize = 254;

/// One-byte discriminator separating the five co-located indexes
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubkeyType {
    /// Data store (id + insertion counter -> item record)
    Data,

    /// Insertion index (insertion counter -> head key)
    Insertion,

    /// Head index (id + version -> flags + insertion counter)
    Head,

    /// Version index (version -> data key)
    Version,

    /// Perspective last-seen index (tag + insertion counter -> version)
    Perspective,
}

impl From<SubkeyType> for u8 {
    fn from(value: SubkeyType) -> Self {
        match value {
            SubkeyType::Data => 0x01,
            SubkeyType::Insertion => 0x02,
            SubkeyType::Head => 0x03,
            SubkeyType::Version => 0x04,
            SubkeyType::Perspective => 0x05,
        }
    }
}

impl TryFrom<u8> for SubkeyType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Data),
            0x02 => Ok(Self::Insertion),
            0x03 => Ok(Self::Head),
            0x04 => Ok(Self::Version),
            0x05 => Ok(Self::Perspective),
            other => Err(DecodeError::UnknownKeyType(other)),
        }
    }
}

/// Appends `n` as a big-endian integer of exactly `width` bytes.
///
/// # Panics
///
/// Panics if `n` does not fit into `width` bytes.
pub(crate) fn push_fixed_uint(buf: &mut Vec<u8>, n: u64, width: Width) {
    assert!(width <= 8, "width must be at most 8 bytes");
    assert!(fits_width(n, width), "integer does not fit into {width} bytes");

    let be = n.to_be_bytes();
    buf.extend_from_slice(be.get(8 - usize::from(width)..).unwrap_or_default());
}

/// Whether `n` is representable in `width` big-endian bytes.
#[must_use]
pub(crate) fn fits_width(n: u64, width: Width) -> bool {
    width >= 8 || n < 1 << (8 * u32::from(width))
}

fn read_fixed_uint(bytes: &[u8]) -> u64 {
    let mut be = [0u8; 8];
    let start = 8 - bytes.len();
    for (dst, src) in be.iter_mut().skip(start).zip(bytes) {
        *dst = *src;
    }
    u64::from_be_bytes(be)
}

/// Key composer for one tree namespace
///
/// Owns the encoded name prefix and the integer widths the tree was opened
/// with; all keys of the tree are composed through it.
#[derive(Clone, Debug)]
pub struct Keyspace {
    prefix: Slice,
    v_size: Width,
    i_size: Width,
}

impl Keyspace {
    /// Builds the keyspace for a tree name.
    ///
    /// # Panics
    ///
    /// Panics if the name exceeds [`MAX_NAME_LEN`] bytes or a width exceeds 6;
    /// [`crate::Config`] validates both before constructing a keyspace.
    #[must_use]
    pub fn new(name: &str, v_size: Width, i_size: Width) -> Self {
        assert!(name.len() <= MAX_NAME_LEN, "name must not exceed 254 bytes");
        assert!(v_size <= 6, "v_size must be between 0 and 6");
        assert!(i_size <= 6, "i_size must be between 0 and 6");

        let mut prefix = Vec::with_capacity(name.len() + 2);

        #[allow(clippy::cast_possible_truncation)]
        prefix.push(name.len() as u8);
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(0x00);

        Self {
            prefix: prefix.into(),
            v_size,
            i_size,
        }
    }

    /// The encoded `len || name || 0x00` prefix.
    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Version identifier width in bytes.
    #[must_use]
    pub fn v_size(&self) -> Width {
        self.v_size
    }

    /// Insertion counter width in bytes.
    #[must_use]
    pub fn i_size(&self) -> Width {
        self.i_size
    }

    fn begin(&self, t: SubkeyType, extra: usize) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.prefix.len() + 1 + extra);
        buf.extend_from_slice(&self.prefix);
        buf.push(u8::from(t));
        buf
    }

    fn push_str(buf: &mut Vec<u8>, s: &[u8]) {
        assert!(!s.is_empty(), "id must be at least one byte");
        assert!(s.len() <= MAX_ID_LEN, "id must not exceed 254 bytes");

        #[allow(clippy::cast_possible_truncation)]
        buf.push(s.len() as u8);
        buf.extend_from_slice(s);
        buf.push(0x00);
    }

    fn push_uint(buf: &mut Vec<u8>, n: u64, width: Width) {
        buf.push(width);
        push_fixed_uint(buf, n, width);
    }

    /// Composes the data store key for `(id, i)`.
    #[must_use]
    pub fn ds_key(&self, id: &[u8], i: u64) -> Vec<u8> {
        let mut buf = self.begin(SubkeyType::Data, id.len() + 3 + usize::from(self.i_size));
        Self::push_str(&mut buf, id);
        Self::push_uint(&mut buf, i, self.i_size);
        buf
    }

    /// Composes the insertion index key for `i`.
    #[must_use]
    pub fn i_key(&self, i: u64) -> Vec<u8> {
        let mut buf = self.begin(SubkeyType::Insertion, 1 + usize::from(self.i_size));
        Self::push_uint(&mut buf, i, self.i_size);
        buf
    }

    /// Composes the head key for `(id, v)`.
    #[must_use]
    pub fn head_key(&self, id: &[u8], v: &Version) -> Vec<u8> {
        let mut buf = self.begin(SubkeyType::Head, id.len() + 3 + v.width());
        Self::push_str(&mut buf, id);
        buf.push(self.v_size);
        buf.extend_from_slice(v.as_bytes());
        buf
    }

    /// Composes the version index key for `v`.
    #[must_use]
    pub fn v_key(&self, v: &Version) -> Vec<u8> {
        let mut buf = self.begin(SubkeyType::Version, 1 + v.width());
        buf.push(self.v_size);
        buf.extend_from_slice(v.as_bytes());
        buf
    }

    /// Composes the perspective key for `(us, i)`.
    #[must_use]
    pub fn us_key(&self, us: &[u8], i: u64) -> Vec<u8> {
        let mut buf = self.begin(SubkeyType::Perspective, us.len() + 3 + usize::from(self.i_size));
        Self::push_str(&mut buf, us);
        Self::push_uint(&mut buf, i, self.i_size);
        buf
    }

    /// Composes the perspective value (`v_size || v`).
    #[must_use]
    pub fn us_val(&self, v: &Version) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + v.width());
        buf.push(self.v_size);
        buf.extend_from_slice(v.as_bytes());
        buf
    }

    /// Parses a perspective value back into a version.
    pub fn parse_us_val(bytes: &[u8]) -> Result<Slice, DecodeError> {
        let mut cur = Cursor::new(bytes);
        let v = cur.length_prefixed_uint_bytes("v")?;
        cur.finish()?;
        Ok(v)
    }
}

/// Head entry value: conflict/delete flags plus the insertion counter
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HeadVal {
    /// Version is flagged as being in conflict
    pub conflict: bool,

    /// Version is a deletion
    pub deleted: bool,

    /// Insertion counter of the head item
    pub i: u64,
}

const HEAD_FLAG_CONFLICT: u8 = 0b0000_0001;
const HEAD_FLAG_DELETED: u8 = 0b0000_0010;

impl HeadVal {
    /// Serializes to `flags(1) || i_size || i_be`.
    #[must_use]
    pub fn compose(&self, i_size: Width) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + usize::from(i_size));

        let mut flags = 0;
        if self.conflict {
            flags |= HEAD_FLAG_CONFLICT;
        }
        if self.deleted {
            flags |= HEAD_FLAG_DELETED;
        }

        buf.push(flags);
        buf.push(i_size);
        push_fixed_uint(&mut buf, self.i, i_size);
        buf
    }

    /// Parses a head value, rejecting unknown flag bits.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cur = Cursor::new(bytes);

        let flags = cur.u8()?;
        if flags & !(HEAD_FLAG_CONFLICT | HEAD_FLAG_DELETED) != 0 {
            return Err(DecodeError::InvalidTag(("head flags", flags)));
        }

        let i = cur.length_prefixed_uint_bytes("i")?;
        cur.finish()?;

        Ok(Self {
            conflict: flags & HEAD_FLAG_CONFLICT != 0,
            deleted: flags & HEAD_FLAG_DELETED != 0,
            i: read_fixed_uint(&i),
        })
    }
}

/// A parsed key: tree name plus the type-specific fields
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedKey {
    /// Tree name bytes
    pub name: Slice,

    /// Type-specific key fields
    pub kind: ParsedKind,
}

/// Type-specific fields of a parsed key
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParsedKind {
    /// Data store key
    Data {
        /// Document id
        id: Slice,
        /// Insertion counter
        i: u64,
    },

    /// Insertion index key
    Insertion {
        /// Insertion counter
        i: u64,
    },

    /// Head key
    Head {
        /// Document id
        id: Slice,
        /// Version bytes
        v: Slice,
    },

    /// Version index key
    Version {
        /// Version bytes
        v: Slice,
    },

    /// Perspective key
    Perspective {
        /// Perspective tag
        us: Slice,
        /// Insertion counter
        i: u64,
    },
}

impl ParsedKey {
    /// Subkey type of this key.
    #[must_use]
    pub fn subkey_type(&self) -> SubkeyType {
        match self.kind {
            ParsedKind::Data { .. } => SubkeyType::Data,
            ParsedKind::Insertion { .. } => SubkeyType::Insertion,
            ParsedKind::Head { .. } => SubkeyType::Head,
            ParsedKind::Version { .. } => SubkeyType::Version,
            ParsedKind::Perspective { .. } => SubkeyType::Perspective,
        }
    }
}

/// Renders bytes as lowercase hex, for diagnostics.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

impl std::fmt::Display for ParsedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = String::from_utf8_lossy(&self.name);

        match &self.kind {
            ParsedKind::Data { id, i } => {
                write!(f, "{name}/data/{}/{i}", hex(id))
            }
            ParsedKind::Insertion { i } => write!(f, "{name}/i/{i}"),
            ParsedKind::Head { id, v } => {
                write!(f, "{name}/head/{}/{}", hex(id), STANDARD_NO_PAD.encode(v))
            }
            ParsedKind::Version { v } => {
                write!(f, "{name}/v/{}", STANDARD_NO_PAD.encode(v))
            }
            ParsedKind::Perspective { us, i } => {
                write!(f, "{name}/us/{}/{i}", String::from_utf8_lossy(us))
            }
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self.bytes.get(self.pos).ok_or(DecodeError::OutOfRange)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::OutOfRange)?;
        let slice = self.bytes.get(self.pos..end).ok_or(DecodeError::OutOfRange)?;
        self.pos = end;
        Ok(slice)
    }

    /// Reads `len(1) || bytes || 0x00`, rejecting a zero length.
    fn null_terminated_str(&mut self, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.u8()?;
        if len == 0 {
            return Err(DecodeError::EmptyField(what));
        }

        let s = self.take(usize::from(len))?;

        if self.u8()? != 0x00 {
            return Err(DecodeError::MissingNullByte(what));
        }

        Ok(s)
    }

    /// Reads `width(1) || bytes`, rejecting a zero width.
    fn length_prefixed_uint_bytes(&mut self, what: &'static str) -> Result<Slice, DecodeError> {
        let width = self.u8()?;
        if width == 0 {
            return Err(DecodeError::EmptyField(what));
        }
        if width > 8 {
            return Err(DecodeError::OutOfRange);
        }

        self.take(usize::from(width)).map(Slice::from)
    }

    fn finish(&self) -> Result<(), DecodeError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(DecodeError::OutOfRange)
        }
    }
}

/// Parses any composed key back into its fields.
pub fn parse_key(bytes: &[u8]) -> Result<ParsedKey, DecodeError> {
    let mut cur = Cursor::new(bytes);

    let name = Slice::from(cur.null_terminated_str("name")?);
    let type_byte = cur.u8()?;
    let t = SubkeyType::try_from(type_byte)?;

    let kind = match t {
        SubkeyType::Data => {
            let id = Slice::from(cur.null_terminated_str("id")?);
            let i = cur.length_prefixed_uint_bytes("i")?;
            ParsedKind::Data {
                id,
                i: read_fixed_uint(&i),
            }
        }
        SubkeyType::Insertion => {
            let i = cur.length_prefixed_uint_bytes("i")?;
            ParsedKind::Insertion {
                i: read_fixed_uint(&i),
            }
        }
        SubkeyType::Head => {
            let id = Slice::from(cur.null_terminated_str("id")?);
            let v = cur.length_prefixed_uint_bytes("v")?;
            ParsedKind::Head { id, v }
        }
        SubkeyType::Version => {
            let v = cur.length_prefixed_uint_bytes("v")?;
            ParsedKind::Version { v }
        }
        SubkeyType::Perspective => {
            let us = Slice::from(cur.null_terminated_str("us")?);
            let i = cur.length_prefixed_uint_bytes("i")?;
            ParsedKind::Perspective {
                us,
                i: read_fixed_uint(&i),
            }
        }
    };

    cur.finish()?;

    Ok(ParsedKey { name, kind })
}
