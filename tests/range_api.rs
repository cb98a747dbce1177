mod common;

use common::{item, open_tree_on, v};
use std::sync::Arc;
use test_log::test;
use vtree::{Direction, MemoryStore, Store};

/// Every key the tree persists must fall into exactly one of the five
/// advertised ranges, and none of another tree's ranges.
#[test]
fn persisted_keys_partition_into_the_advertised_ranges() -> vtree::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let tree = open_tree_on(store.clone(), "mine");
    let other = open_tree_on(store.clone(), "other");

    tree.write(item("doc", "Aaaa").perspective("peer"))?;
    tree.write(item("doc", "Bbbb").parent(v("Aaaa")).perspective("peer"))?;
    tree.drain()?;

    other.write(item("doc", "Cccc"))?;
    other.drain()?;

    let ranges = [
        tree.ds_key_range(None, None, None),
        tree.i_key_range(None, None),
        tree.head_key_range(),
        tree.v_key_range(),
        tree.us_key_range(None),
    ];

    let mut per_range = [0usize; 5];
    let mut total_mine = 0usize;

    for pair in store.range(&[], &[0xff; 4], Direction::Forward) {
        let (key, _) = pair?;

        let hits: Vec<usize> = ranges
            .iter()
            .enumerate()
            .filter(|(_, range)| range.contains(&key))
            .map(|(n, _)| n)
            .collect();

        let parsed = vtree::parse_key(&key)?;
        if parsed.name == *b"mine" {
            assert_eq!(1, hits.len(), "key must fall into exactly one range");
            per_range[hits[0]] += 1;
            total_mine += 1;
        } else {
            assert!(hits.is_empty(), "foreign key must not fall into any range");
        }
    }

    // 2 items -> 2 data, 2 insertion, 2 version entries; 1 head survives,
    // 1 perspective marker
    assert_eq!([2, 2, 1, 2, 1], per_range);
    assert_eq!(8, total_mine);
    Ok(())
}

#[test]
fn ds_range_brackets_by_id_and_counter() -> vtree::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let tree = open_tree_on(store.clone(), "mine");

    tree.write(item("doc", "Aaaa"))?;
    tree.write(item("doc", "Bbbb").parent(v("Aaaa")))?;
    tree.write(item("doc", "Cccc").parent(v("Bbbb")))?;
    tree.write(item("oth", "Dddd"))?;
    tree.drain()?;

    let range = tree.ds_key_range(Some(b"doc"), Some(2), Some(3));
    let hits = store
        .range(&range.start, &range.end, Direction::Forward)
        .count();
    assert_eq!(2, hits);

    let range = tree.ds_key_range(Some(b"doc"), None, None);
    let hits = store
        .range(&range.start, &range.end, Direction::Forward)
        .count();
    assert_eq!(3, hits);
    Ok(())
}

#[test]
fn i_range_brackets_scan_windows() -> vtree::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let tree = open_tree_on(store.clone(), "mine");

    tree.write(item("doc", "Aaaa"))?;
    tree.write(item("doc", "Bbbb").parent(v("Aaaa")))?;
    tree.write(item("doc", "Cccc").parent(v("Bbbb")))?;
    tree.drain()?;

    let range = tree.i_key_range(Some(2), None);
    let hits = store
        .range(&range.start, &range.end, Direction::Forward)
        .count();
    assert_eq!(2, hits);

    let range = tree.us_key_range(None);
    let hits = store
        .range(&range.start, &range.end, Direction::Forward)
        .count();
    assert_eq!(0, hits);
    Ok(())
}
