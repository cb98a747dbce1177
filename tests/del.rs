mod common;

use common::{item, open_tree, v};
use std::sync::Arc;
use test_log::test;
use vtree::{Config, MemoryStore, ReadStreamOpts};

fn open_unvalidated(name: &str) -> vtree::Result<vtree::Tree> {
    Config::new(name)
        .v_size(common::V_SIZE)
        .skip_validation(true)
        .open(Arc::new(MemoryStore::new()))
}

#[test]
fn del_requires_skip_validation() -> vtree::Result<()> {
    let tree = open_tree("del");

    tree.write(item("X", "Aaaa"))?;
    tree.drain()?;

    let err = tree.del(&item("X", "Aaaa")).unwrap_err();
    assert_eq!(
        "del is only available if skip_validation is set to true",
        err.to_string()
    );
    Ok(())
}

#[test]
fn del_removes_all_index_entries() -> vtree::Result<()> {
    let tree = open_unvalidated("del")?;

    tree.write(item("X", "Aaaa"))?;
    tree.write(item("X", "Bbbb").parent(v("Aaaa")))?;
    tree.drain()?;

    tree.del(&item("X", "Bbbb"))?;

    assert!(tree.get_by_version(&v("Bbbb"))?.is_none());
    assert!(tree.get_head_versions(b"X")?.is_empty());

    let remaining: Vec<_> = tree
        .read_stream(ReadStreamOpts::new())?
        .map(|entry| entry.unwrap().item.unwrap().header.version)
        .collect();
    assert_eq!(vec![v("Aaaa")], remaining);
    Ok(())
}

#[test]
fn del_of_unknown_version_fails() -> vtree::Result<()> {
    let tree = open_unvalidated("del")?;

    let err = tree.del(&item("X", "Qqqq")).unwrap_err();
    assert_eq!("version not found", err.to_string());
    Ok(())
}

#[test]
fn skip_validation_accepts_disconnected_items() -> vtree::Result<()> {
    let tree = open_unvalidated("del")?;

    // unknown parent, would be rejected on a validating tree
    tree.write(item("X", "Bbbb").parent(v("Qqqq")))?;

    // a second root next to a live head, also normally rejected
    tree.write(item("X", "Xxxx"))?;
    tree.drain()?;

    assert!(tree.get_by_version(&v("Bbbb"))?.is_some());
    assert!(tree.get_by_version(&v("Xxxx"))?.is_some());
    Ok(())
}
