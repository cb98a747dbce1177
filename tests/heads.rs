mod common;

use common::{open_tree, vn};
use test_log::test;
use vtree::{HeadStreamOpts, Item};

/// Lays out three documents with forked histories:
///
/// `a`: 1 -> {2, 3}    (two heads)
/// `b`: 4              (single head)
/// `c`: 5 -> 6, d=true (deletion head)
fn populate(tree: &vtree::Tree) -> vtree::Result<()> {
    tree.write(Item::new("a", vn(1)))?;
    tree.write(Item::new("a", vn(2)).parent(vn(1)))?;
    tree.write(Item::new("a", vn(3)).parent(vn(1)))?;
    tree.write(Item::new("b", vn(4)))?;
    tree.write(Item::new("c", vn(5)))?;
    tree.write(Item::new("c", vn(6)).parent(vn(5)).deleted())?;
    tree.drain()
}

#[test]
fn heads_iterate_by_id_then_insertion_order() -> vtree::Result<()> {
    let tree = open_tree("heads");
    populate(&tree)?;

    let emitted: Vec<(Vec<u8>, u64)> = tree
        .heads(HeadStreamOpts::new())
        .map(|head| {
            let head = head.unwrap();
            (head.header.id.to_vec(), head.header.i.unwrap())
        })
        .collect();

    assert_eq!(
        vec![
            (b"a".to_vec(), 2),
            (b"a".to_vec(), 3),
            (b"b".to_vec(), 4),
            (b"c".to_vec(), 6),
        ],
        emitted
    );
    Ok(())
}

#[test]
fn heads_filter_by_id() -> vtree::Result<()> {
    let tree = open_tree("heads");
    populate(&tree)?;

    let emitted: Vec<u64> = tree
        .heads(HeadStreamOpts::new().id("a"))
        .map(|head| head.unwrap().header.i.unwrap())
        .collect();

    assert_eq!(vec![2, 3], emitted);
    Ok(())
}

#[test]
fn heads_skip_deletes() -> vtree::Result<()> {
    let tree = open_tree("heads");
    populate(&tree)?;

    let emitted: Vec<u64> = tree
        .heads(HeadStreamOpts::new().skip_deletes())
        .map(|head| head.unwrap().header.i.unwrap())
        .collect();

    // the deletion head of c is filtered out
    assert_eq!(vec![2, 3, 4], emitted);
    Ok(())
}

#[test]
fn get_heads_visitor_stops_cleanly() -> vtree::Result<()> {
    let tree = open_tree("heads");
    populate(&tree)?;

    let mut seen = 0;
    let ran_out = tree.get_heads(HeadStreamOpts::new(), |_| {
        seen += 1;
        Ok(seen < 2)
    })?;

    assert!(!ran_out);
    assert_eq!(2, seen);

    let mut total = 0;
    let ran_out = tree.get_heads(HeadStreamOpts::new(), |_| {
        total += 1;
        Ok(true)
    })?;

    assert!(ran_out);
    assert_eq!(4, total);
    Ok(())
}

#[test]
fn get_heads_visitor_propagates_errors() -> vtree::Result<()> {
    let tree = open_tree("heads");
    populate(&tree)?;

    let err = tree
        .get_heads(HeadStreamOpts::new(), |_| Err(vtree::Error::VersionNotFound))
        .unwrap_err();
    assert_eq!("version not found", err.to_string());
    Ok(())
}

#[test]
fn heads_of_empty_tree() -> vtree::Result<()> {
    let tree = open_tree("heads");

    assert_eq!(0, tree.heads(HeadStreamOpts::new()).count());
    assert_eq!(0, tree.stats()?.heads.count);
    assert!(tree.get_head_versions(b"nope")?.is_empty());
    Ok(())
}

#[test]
fn stats_track_all_flags() -> vtree::Result<()> {
    let tree = open_tree("heads");
    populate(&tree)?;

    tree.set_conflict_by_version(&vn(3))?;

    let stats = tree.stats()?;
    assert_eq!(4, stats.heads.count);
    assert_eq!(1, stats.heads.conflict);
    assert_eq!(1, stats.heads.deleted);
    Ok(())
}
