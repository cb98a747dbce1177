// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Write-path validation
//!
//! A new item is checked against the persisted indexes *and* the in-flight
//! write buffer: the two together are the authoritative view. A parent is
//! known if it is persisted or buffered ahead of the item under validation.

use super::write_buffer::WriteBuffer;
use crate::{
    item::Item,
    key::{parse_key, Keyspace, ParsedKind},
    range::head_key_range,
    store::{Direction, Store},
    version::Version,
    Error, HeadVal, Slice,
};

/// What the committer should do with an accepted write
pub(crate) enum Outcome {
    /// Persist the item; `parents` may have been rewritten by the deletion
    /// reconnection rule
    Insert {
        /// Effective parent versions
        parents: Vec<Version>,
    },

    /// The version already exists and was re-sent by a remote source:
    /// only advance its perspective marker
    Marker {
        /// Perspective tag
        us: Slice,
        /// Version the marker points at
        v: Version,
        /// Insertion counter of the already stored item
        i: u64,
    },
}

fn rejected(problem_parents: Vec<Version>) -> Error {
    Error::NotValidNewItem { problem_parents }
}

/// A head as seen through the persisted index overlaid with buffered items.
struct HeadView {
    v: Version,
    deleted: bool,
    i: u64,
}

/// Validates `item` and decides the commit outcome.
///
/// Called with the buffer lock held, so the buffered view cannot shift
/// underneath the checks.
pub(crate) fn validate_new_item<S: Store>(
    item: &Item,
    buffer: &WriteBuffer,
    store: &S,
    ks: &Keyspace,
    local_perspective: Option<&Slice>,
    skip_validation: bool,
) -> crate::Result<Outcome> {
    let h = &item.header;

    // structural checks; these gate encodability and apply even with
    // skip_validation, otherwise malformed keys would enter the indexes
    if h.id.is_empty() || h.id.len() > crate::key::MAX_ID_LEN {
        log::debug!("rejecting item: bad id length {}", h.id.len());
        return Err(rejected(vec![]));
    }
    if h.version.width() != usize::from(ks.v_size()) {
        log::debug!(
            "rejecting item {}: version width {} != {}",
            h.version,
            h.version.width(),
            ks.v_size()
        );
        return Err(rejected(vec![]));
    }
    if h.parents
        .iter()
        .any(|p| p.width() != usize::from(ks.v_size()))
    {
        log::debug!("rejecting item {}: parent width mismatch", h.version);
        return Err(rejected(vec![]));
    }
    if h.perspective.as_ref().is_some_and(|us| {
        us.is_empty() || us.len() > crate::key::MAX_ID_LEN
    }) {
        log::debug!("rejecting item {}: bad perspective length", h.version);
        return Err(rejected(vec![]));
    }

    if skip_validation {
        return Ok(Outcome::Insert {
            parents: h.parents.clone(),
        });
    }

    let is_local = match (&h.perspective, local_perspective) {
        (None, _) => true,
        (Some(us), Some(local)) => us == local,
        (Some(_), None) => false,
    };

    // duplicate check, buffer first: an item is in the buffer or in the
    // store (or both, while its batch is in flight), never in neither
    let existing = lookup_version(item, buffer, store, ks)?;

    if let Some(existing) = existing {
        if !is_local {
            if existing.same_content(item) {
                // re-sent by a remote source; advance the marker only
                let Some(us) = h.perspective.clone() else {
                    return Err(rejected(vec![]));
                };
                let Some(i) = existing.header.i else {
                    return Err(rejected(vec![]));
                };

                return Ok(Outcome::Marker {
                    us,
                    v: h.version.clone(),
                    i,
                });
            }

            log::debug!(
                "rejecting item {}: version exists with different content",
                h.version
            );
            return Err(rejected(vec![]));
        }

        log::debug!("rejecting item {}: duplicate version", h.version);
        return Err(rejected(vec![]));
    }

    // perspective bypass: items from other sources are stored as received
    if !is_local {
        return Ok(Outcome::Insert {
            parents: h.parents.clone(),
        });
    }

    if h.parents.is_empty() {
        validate_root(item, buffer, store, ks)
    } else {
        validate_connected(item, buffer, store, ks)
    }
}

/// Root rule: a second root next to a non-deleted head is rejected, but a
/// root following a deletion head is accepted and reconnected to it.
fn validate_root<S: Store>(
    item: &Item,
    buffer: &WriteBuffer,
    store: &S,
    ks: &Keyspace,
) -> crate::Result<Outcome> {
    let heads = current_heads(&item.header.id, buffer, store, ks)?;

    let Some(most_recent) = heads.iter().max_by_key(|head| head.i) else {
        return Ok(Outcome::Insert { parents: vec![] });
    };

    if most_recent.deleted {
        // deletion reconnection: the new root continues the lineage
        Ok(Outcome::Insert {
            parents: vec![most_recent.v.clone()],
        })
    } else {
        log::debug!(
            "rejecting root {}: id has non-deleted head {}",
            item.header.version,
            most_recent.v
        );
        Err(rejected(vec![]))
    }
}

/// Connectivity rule: every parent must resolve to an existing version of
/// the same id, through the version index or the buffer.
fn validate_connected<S: Store>(
    item: &Item,
    buffer: &WriteBuffer,
    store: &S,
    ks: &Keyspace,
) -> crate::Result<Outcome> {
    let mut problem_parents = vec![];

    for parent in &item.header.parents {
        if let Some(buffered) = buffer.get_by_version(parent.as_bytes()) {
            if buffered.header.id == item.header.id {
                continue;
            }
            problem_parents.push(parent.clone());
            continue;
        }

        match store.get(&ks.v_key(parent))? {
            Some(ds_key) => match parse_key(&ds_key)?.kind {
                ParsedKind::Data { id, .. } if id == item.header.id => {}
                _ => problem_parents.push(parent.clone()),
            },
            None => problem_parents.push(parent.clone()),
        }
    }

    if problem_parents.is_empty() {
        Ok(Outcome::Insert {
            parents: item.header.parents.clone(),
        })
    } else {
        log::debug!(
            "rejecting item {}: {} unresolved parent(s)",
            item.header.version,
            problem_parents.len()
        );
        Err(rejected(problem_parents))
    }
}

/// Resolves a version to its item, consulting the buffer first.
fn lookup_version<S: Store>(
    item: &Item,
    buffer: &WriteBuffer,
    store: &S,
    ks: &Keyspace,
) -> crate::Result<Option<Item>> {
    let v = &item.header.version;

    if let Some(buffered) = buffer.get_by_version(v.as_bytes()) {
        return Ok(Some(buffered.as_ref().clone()));
    }

    let Some(ds_key) = store.get(&ks.v_key(v))? else {
        return Ok(None);
    };
    let Some(record) = store.get(&ds_key)? else {
        return Err(Error::Unrecoverable);
    };

    Item::from_record(&record).map(Some).map_err(Error::from)
}

/// Heads of an id: the persisted head index overlaid with buffered items
/// (each buffered item becomes a head and supersedes its parents).
fn current_heads<S: Store>(
    id: &Slice,
    buffer: &WriteBuffer,
    store: &S,
    ks: &Keyspace,
) -> crate::Result<Vec<HeadView>> {
    let mut heads: Vec<HeadView> = vec![];

    let range = head_key_range(ks, Some(id.as_ref()));
    for pair in store.range(&range.start, &range.end, Direction::Forward) {
        let (key, value) = pair?;

        let ParsedKind::Head { v, .. } = parse_key(&key)?.kind else {
            return Err(Error::Unrecoverable);
        };
        let head_val = HeadVal::parse(&value)?;

        heads.push(HeadView {
            v: Version::from_slice(v, ks.v_size()).map_err(|_| Error::Unrecoverable)?,
            deleted: head_val.deleted,
            i: head_val.i,
        });
    }

    for buffered in buffer.items_for_id(id) {
        // a buffered item may already be persisted while its slot is still
        // held, so drop both its parents and any stale copy of itself
        heads.retain(|head| {
            head.v != buffered.header.version
                && !buffered
                    .header
                    .parents
                    .iter()
                    .any(|parent| *parent == head.v)
        });

        heads.push(HeadView {
            v: buffered.header.version.clone(),
            deleted: buffered.header.deleted,
            // stamped before the item entered the buffer
            i: buffered.header.i.unwrap_or_default(),
        });
    }

    Ok(heads)
}
