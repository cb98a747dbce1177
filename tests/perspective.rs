mod common;

use common::{item, open_tree, v};
use std::sync::Arc;
use test_log::test;
use vtree::{Config, MemoryStore};

#[test]
fn marker_follows_the_latest_item() -> vtree::Result<()> {
    let tree = open_tree("persp");

    tree.write(item("X", "Aaaa").perspective("lbp"))?;
    tree.write(item("X", "Bbbb").parent(v("Aaaa")).perspective("lbp"))?;
    tree.drain()?;

    assert_eq!(Some(v("Bbbb")), tree.last_by_perspective(b"lbp")?);
    Ok(())
}

#[test]
fn marker_does_not_rewind() -> vtree::Result<()> {
    let tree = open_tree("persp");

    tree.write(item("X", "Aaaa").perspective("lbp"))?;
    tree.write(item("X", "Bbbb").parent(v("Aaaa")).perspective("lbp"))?;
    tree.drain()?;

    // re-sending the first item maps to a lower insertion counter and
    // must not move the marker backwards
    tree.write(item("X", "Aaaa").perspective("lbp"))?;
    tree.drain()?;

    assert_eq!(Some(v("Bbbb")), tree.last_by_perspective(b"lbp")?);
    Ok(())
}

#[test]
fn remote_items_bypass_root_validation() -> vtree::Result<()> {
    let tree = open_tree("persp");

    tree.write(item("X", "Aaaa"))?;
    tree.drain()?;

    // a second root for X would be rejected locally, but this one was
    // received from a remote source and is stored as-is
    tree.write(item("X", "Xxxx").perspective("remote"))?;
    tree.drain()?;

    assert!(tree.get_by_version(&v("Xxxx"))?.is_some());
    assert_eq!(Some(v("Xxxx")), tree.last_by_perspective(b"remote")?);
    Ok(())
}

#[test]
fn remote_items_bypass_connectivity_validation() -> vtree::Result<()> {
    let tree = open_tree("persp");

    // the parent is unknown, yet the item is accepted verbatim
    tree.write(item("X", "Bbbb").parent(v("Qqqq")).perspective("remote"))?;
    tree.drain()?;

    let stored = tree.get_by_version(&v("Bbbb"))?.unwrap();
    assert_eq!(vec![v("Qqqq")], stored.header.parents);
    Ok(())
}

#[test]
fn local_perspective_validates_like_untagged() -> vtree::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let tree = Config::new("persp")
        .v_size(common::V_SIZE)
        .perspective("local")
        .open(store)?;

    tree.write(item("X", "Aaaa").perspective("local"))?;
    tree.drain()?;

    // items tagged with the tree's own perspective do not bypass the rules
    let err = tree
        .write(item("X", "Xxxx").perspective("local"))
        .unwrap_err();
    assert_eq!("not a valid new item", err.to_string());
    Ok(())
}

#[test]
fn equal_reinsertion_from_remote_only_moves_the_marker() -> vtree::Result<()> {
    let tree = open_tree("persp");

    tree.write(item("X", "Aaaa").perspective("lbp"))?;
    tree.drain()?;
    let before = tree.len_approx();

    // the exact same item again: no new version, no new counter
    tree.write(item("X", "Aaaa").perspective("lbp"))?;
    tree.drain()?;

    assert_eq!(before, tree.len_approx());
    assert_eq!(Some(v("Aaaa")), tree.last_by_perspective(b"lbp")?);
    Ok(())
}

#[test]
fn conflicting_reinsertion_from_remote_is_rejected() -> vtree::Result<()> {
    let tree = open_tree("persp");

    tree.write(item("X", "Aaaa").perspective("lbp").body(b"one".to_vec()))?;
    tree.drain()?;

    // same version, different content
    let err = tree
        .write(item("X", "Aaaa").perspective("lbp").body(b"two".to_vec()))
        .unwrap_err();
    assert_eq!("not a valid new item", err.to_string());
    Ok(())
}

#[test]
fn markers_are_tracked_per_perspective() -> vtree::Result<()> {
    let tree = open_tree("persp");

    tree.write(item("X", "Aaaa").perspective("alice"))?;
    tree.write(item("Y", "Bbbb").perspective("bob"))?;
    tree.drain()?;

    assert_eq!(Some(v("Aaaa")), tree.last_by_perspective(b"alice")?);
    assert_eq!(Some(v("Bbbb")), tree.last_by_perspective(b"bob")?);
    assert_eq!(None, tree.last_by_perspective(b"carol")?);
    Ok(())
}
