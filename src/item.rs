// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Stored item records
//!
//! A data store entry is one self-describing binary record:
//!
//! ```text
//! flags(1)                      bit 0 conflict, bit 1 deleted,
//!                               bit 2 perspective present, bit 3 i present
//! id_len(1) || id
//! v_len(1)  || v
//! parent_count(varint) || parent_count x v_len parent versions
//! [pe_len(1) || pe]             when bit 2 is set
//! [i_len(1)  || i_be]           when bit 3 is set
//! body_len(varint) || body
//! ```
//!
//! The insertion counter `i` is absent on items handed to `write` and is
//! stamped by the committer before the record is persisted.

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    key::MAX_ID_LEN,
    version::{Version, Width},
    Slice,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

const FLAG_CONFLICT: u8 = 0b0000_0001;
const FLAG_DELETED: u8 = 0b0000_0010;
const FLAG_PERSPECTIVE: u8 = 0b0000_0100;
const FLAG_I: u8 = 0b0000_1000;

/// Header of a stored item
#[derive(Clone, Debug)]
pub struct ItemHeader {
    /// Application-supplied id of the logical document
    pub id: Slice,

    /// Version identifier of this item
    pub version: Version,

    /// Parent versions, in application order (empty for a root)
    pub parents: Vec<Version>,

    /// Tag of the external source this item was received from, if any
    pub perspective: Option<Slice>,

    /// Item is flagged as being in conflict
    pub conflict: bool,

    /// Item is a deletion
    pub deleted: bool,

    /// Insertion counter, stamped by the tree on commit (1-based)
    pub i: Option<u64>,
}

/// A versioned document item: header plus opaque body
#[derive(Clone, Debug)]
pub struct Item {
    /// Item header
    pub header: ItemHeader,

    /// Opaque body bytes
    pub body: Slice,
}

impl Item {
    /// Creates a new item for `(id, version)` with no parents and an empty body.
    ///
    /// # Panics
    ///
    /// Panics if the id is empty or exceeds 254 bytes.
    #[must_use]
    pub fn new(id: impl Into<Slice>, version: Version) -> Self {
        let id = id.into();

        assert!(!id.is_empty(), "id must be at least one byte");
        assert!(id.len() <= MAX_ID_LEN, "id must not exceed 254 bytes");

        Self {
            header: ItemHeader {
                id,
                version,
                parents: Vec::new(),
                perspective: None,
                conflict: false,
                deleted: false,
                i: None,
            },
            body: Slice::empty(),
        }
    }

    /// Adds a parent version.
    #[must_use]
    pub fn parent(mut self, v: Version) -> Self {
        self.header.parents.push(v);
        self
    }

    /// Sets the parent versions.
    #[must_use]
    pub fn parents<I: IntoIterator<Item = Version>>(mut self, parents: I) -> Self {
        self.header.parents = parents.into_iter().collect();
        self
    }

    /// Tags the item with the external source it was received from.
    #[must_use]
    pub fn perspective(mut self, us: impl Into<Slice>) -> Self {
        self.header.perspective = Some(us.into());
        self
    }

    /// Flags the item as a deletion.
    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.header.deleted = true;
        self
    }

    /// Flags the item as being in conflict.
    #[must_use]
    pub fn conflict(mut self) -> Self {
        self.header.conflict = true;
        self
    }

    /// Sets the opaque body.
    ///
    /// # Panics
    ///
    /// Panics if the body exceeds 2^32 bytes.
    #[must_use]
    pub fn body(mut self, body: impl Into<Slice>) -> Self {
        let body = body.into();

        assert!(
            u32::try_from(body.len()).is_ok(),
            "bodies can be 2^32 bytes in length"
        );

        self.body = body;
        self
    }

    /// Whether two items carry the same content, ignoring the stamped
    /// insertion counter.
    ///
    /// Used to recognize a re-insertion of an already stored version.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.header.id == other.header.id
            && self.header.version == other.header.version
            && self.header.parents == other.header.parents
            && self.header.deleted == other.header.deleted
            && self.body == other.body
    }

    /// Decodes a full record, rejecting trailing bytes.
    pub fn from_record(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = bytes;
        let item = Self::decode_from(&mut reader)?;

        if reader.is_empty() {
            Ok(item)
        } else {
            Err(DecodeError::OutOfRange)
        }
    }
}

impl Encode for Item {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let h = &self.header;

        let mut flags = 0;
        if h.conflict {
            flags |= FLAG_CONFLICT;
        }
        if h.deleted {
            flags |= FLAG_DELETED;
        }
        if h.perspective.is_some() {
            flags |= FLAG_PERSPECTIVE;
        }
        if h.i.is_some() {
            flags |= FLAG_I;
        }
        writer.write_u8(flags)?;

        // NOTE: Truncation is okay, id length is capped at 254
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u8(h.id.len() as u8)?;
        writer.write_all(&h.id)?;

        #[allow(clippy::cast_possible_truncation)]
        writer.write_u8(h.version.width() as u8)?;
        writer.write_all(h.version.as_bytes())?;

        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32_varint(h.parents.len() as u32)?;
        for parent in &h.parents {
            writer.write_all(parent.as_bytes())?;
        }

        if let Some(us) = &h.perspective {
            #[allow(clippy::cast_possible_truncation)]
            writer.write_u8(us.len() as u8)?;
            writer.write_all(us)?;
        }

        if let Some(i) = h.i {
            let be = i.to_be_bytes();
            let skip = be.iter().take(7).take_while(|b| **b == 0).count();

            #[allow(clippy::cast_possible_truncation)]
            writer.write_u8((8 - skip) as u8)?;
            writer.write_all(be.get(skip..).unwrap_or_default())?;
        }

        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32_varint(self.body.len() as u32)?;
        writer.write_all(&self.body)?;

        Ok(())
    }
}

impl Decode for Item {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let flags = reader.read_u8()?;
        if flags & !(FLAG_CONFLICT | FLAG_DELETED | FLAG_PERSPECTIVE | FLAG_I) != 0 {
            return Err(DecodeError::InvalidTag(("item flags", flags)));
        }

        let id_len = reader.read_u8()?;
        if id_len == 0 {
            return Err(DecodeError::EmptyField("id"));
        }
        let id = Slice::from_reader(reader, id_len.into())?;

        let v_len = reader.read_u8()?;
        if v_len == 0 {
            return Err(DecodeError::EmptyField("v"));
        }
        let v_width = Width::from(v_len);
        let version = read_version(reader, v_width)?;

        let parent_count = reader.read_u32_varint()?;
        let mut parents = Vec::with_capacity(parent_count as usize);
        for _ in 0..parent_count {
            parents.push(read_version(reader, v_width)?);
        }

        let perspective = if flags & FLAG_PERSPECTIVE != 0 {
            let us_len = reader.read_u8()?;
            if us_len == 0 {
                return Err(DecodeError::EmptyField("us"));
            }
            Some(Slice::from_reader(reader, us_len.into())?)
        } else {
            None
        };

        let i = if flags & FLAG_I != 0 {
            let i_len = reader.read_u8()?;
            if i_len == 0 {
                return Err(DecodeError::EmptyField("i"));
            }
            if i_len > 8 {
                return Err(DecodeError::OutOfRange);
            }

            let mut be = [0u8; 8];
            let dst = be.get_mut((8 - usize::from(i_len))..).unwrap_or_default();
            reader.read_exact(dst)?;
            Some(u64::from_be_bytes(be))
        } else {
            None
        };

        let body_len = reader.read_u32_varint()?;
        let body = Slice::from_reader(reader, body_len as usize)?;

        Ok(Self {
            header: ItemHeader {
                id,
                version,
                parents,
                perspective,
                conflict: flags & FLAG_CONFLICT != 0,
                deleted: flags & FLAG_DELETED != 0,
                i,
            },
            body,
        })
    }
}

fn read_version<R: Read>(reader: &mut R, width: Width) -> Result<Version, DecodeError> {
    let bytes = Slice::from_reader(reader, width.into())?;

    // width always matches, the byte count was just read
    Version::from_slice(bytes, width).map_err(|_| DecodeError::OutOfRange)
}
