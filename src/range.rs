// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Range planning for prefix scans over the five indexes
//!
//! Every planner returns a half-open `[start, end)` byte range that visits
//! exactly the keys of one index for one tree. Ranges never cross subkey type
//! boundaries or tree name boundaries.
//!
//! For indexes whose suffix starts with a length-prefixed string (data store,
//! heads, perspectives) the end bound appends `0xff`: every real key continues
//! with a length byte below `0xff`, so all of them sort before it. For the
//! width-bounded integer indexes the end bound is `(width + 1)` followed by
//! `width + 1` `0xff` bytes, which sorts after every real `width || be_int`
//! suffix.

use crate::key::{fits_width, push_fixed_uint, Keyspace, SubkeyType};

/// A half-open `[start, end)` key range
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyRange {
    /// Inclusive lower bound
    pub start: Vec<u8>,

    /// Exclusive upper bound
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Whether `key` falls into this range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        *key >= *self.start && *key < *self.end
    }
}

fn type_prefix(ks: &Keyspace, t: SubkeyType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ks.prefix().len() + 1);
    buf.extend_from_slice(ks.prefix());
    buf.push(u8::from(t));
    buf
}

/// Appends the `(width + 1) || 0xff…` sentinel that caps a
/// `width || be_int` suffix.
fn push_uint_cap(buf: &mut Vec<u8>, width: u8) {
    buf.push(width + 1);
    for _ in 0..=width {
        buf.push(0xff);
    }
}

fn push_id(buf: &mut Vec<u8>, id: &[u8]) {
    #[allow(clippy::cast_possible_truncation)]
    buf.push(id.len() as u8);
    buf.extend_from_slice(id);
    buf.push(0x00);
}

/// Bounds an integer-suffixed range by optional `min_i`/`max_i`.
///
/// `min_i` replaces the start with `width || min_i`; `max_i` makes the end
/// `width || max_i || 0x00`, which is the smallest key sorting after the
/// `max_i` entry itself (inclusive bracket). Out-of-width bounds degrade to
/// the unbracketed bound, or to an empty range when nothing can match.
fn bracket_uint(
    start: &mut Vec<u8>,
    end: &mut Vec<u8>,
    width: u8,
    min_i: Option<u64>,
    max_i: Option<u64>,
) {
    if let Some(min_i) = min_i {
        if fits_width(min_i, width) {
            start.push(width);
            push_fixed_uint(start, min_i, width);
        } else {
            // nothing at or above min_i is representable
            start.clone_from(end);
            return;
        }
    }

    if let Some(max_i) = max_i {
        if fits_width(max_i, width) {
            end.truncate(end.len() - usize::from(width) - 2);
            end.push(width);
            push_fixed_uint(end, max_i, width);
            end.push(0x00);
        }
    }
}

/// Range over all head keys of the tree, or of a single id.
#[must_use]
pub fn head_key_range(ks: &Keyspace, id: Option<&[u8]>) -> KeyRange {
    let mut start = type_prefix(ks, SubkeyType::Head);
    let mut end;

    if let Some(id) = id {
        push_id(&mut start, id);
        end = start.clone();
        push_uint_cap(&mut end, ks.v_size());
    } else {
        end = start.clone();
        end.push(0xff);
    }

    KeyRange { start, end }
}

/// Range over data store keys, optionally bracketed to one id and an
/// insertion counter window.
#[must_use]
pub fn ds_key_range(
    ks: &Keyspace,
    id: Option<&[u8]>,
    min_i: Option<u64>,
    max_i: Option<u64>,
) -> KeyRange {
    let mut start = type_prefix(ks, SubkeyType::Data);
    let mut end;

    if let Some(id) = id {
        push_id(&mut start, id);
        end = start.clone();
        push_uint_cap(&mut end, ks.i_size());
        bracket_uint(&mut start, &mut end, ks.i_size(), min_i, max_i);
    } else {
        end = start.clone();
        end.push(0xff);
    }

    KeyRange { start, end }
}

/// Range over the insertion index, optionally bracketed by `min_i`/`max_i`.
#[must_use]
pub fn i_key_range(ks: &Keyspace, min_i: Option<u64>, max_i: Option<u64>) -> KeyRange {
    let mut start = type_prefix(ks, SubkeyType::Insertion);
    let mut end = start.clone();
    push_uint_cap(&mut end, ks.i_size());

    bracket_uint(&mut start, &mut end, ks.i_size(), min_i, max_i);

    KeyRange { start, end }
}

/// Range over the version index.
#[must_use]
pub fn v_key_range(ks: &Keyspace) -> KeyRange {
    let start = type_prefix(ks, SubkeyType::Version);
    let mut end = start.clone();
    push_uint_cap(&mut end, ks.v_size());

    KeyRange { start, end }
}

/// Range over perspective keys, optionally restricted to one perspective tag.
#[must_use]
pub fn us_key_range(ks: &Keyspace, us: Option<&[u8]>) -> KeyRange {
    let mut start = type_prefix(ks, SubkeyType::Perspective);
    let mut end;

    if let Some(us) = us {
        push_id(&mut start, us);
        end = start.clone();
        push_uint_cap(&mut end, ks.i_size());
    } else {
        end = start.clone();
        end.push(0xff);
    }

    KeyRange { start, end }
}
