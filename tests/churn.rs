mod common;

use common::{open_tree, vn};
use rand::prelude::*;
use test_log::test;
use vtree::{HeadStreamOpts, Item, ReadStreamOpts};

/// Interleaves linear histories of many documents in random order and
/// checks the global invariants afterwards.
#[test]
fn interleaved_histories_keep_invariants() -> vtree::Result<()> {
    let mut rng = StdRng::seed_from_u64(0xDEC0DE);
    let tree = open_tree("churn");

    const DOCS: usize = 8;
    const VERSIONS_PER_DOC: u64 = 12;

    let ids: Vec<String> = (0..DOCS).map(|_| nanoid::nanoid!(8)).collect();

    // one token per write, shuffled across documents; within one document
    // the order stays parent-before-child because each token just advances
    // that document's chain by one
    let mut schedule: Vec<usize> = (0..DOCS)
        .flat_map(|doc| std::iter::repeat(doc).take(VERSIONS_PER_DOC as usize))
        .collect();
    schedule.shuffle(&mut rng);

    let mut tick = vec![0u64; DOCS];
    let mut written = 0u64;
    for doc in schedule {
        let k = tick[doc];
        tick[doc] = k + 1;

        let version = vn((doc as u64) * VERSIONS_PER_DOC + k + 1);
        let mut item = Item::new(ids[doc].as_str(), version);
        if k > 0 {
            item = item.parent(vn((doc as u64) * VERSIONS_PER_DOC + k));
        }

        tree.write(item)?;
        written += 1;

        if written % 16 == 0 {
            tree.drain()?;
        }
    }
    tree.drain()?;

    // every document contributed its full chain
    assert_eq!(DOCS as u64 * VERSIONS_PER_DOC, written);

    // insertion counters are dense and strictly increasing
    let counters: Vec<u64> = tree
        .read_stream(ReadStreamOpts::new())?
        .map(|entry| entry.unwrap().item.unwrap().header.i.unwrap())
        .collect();
    assert_eq!((1..=written).collect::<Vec<_>>(), counters);

    // exactly one head per document, the chain tip
    let heads: Vec<_> = tree
        .heads(HeadStreamOpts::new())
        .map(|head| head.unwrap())
        .collect();
    assert_eq!(DOCS, heads.len());

    for head in &heads {
        let id = std::str::from_utf8(&head.header.id).unwrap();
        let doc = ids.iter().position(|candidate| candidate == id).unwrap();
        assert_eq!(
            vn((doc as u64 + 1) * VERSIONS_PER_DOC),
            head.header.version
        );
    }

    assert_eq!(DOCS as u64, tree.stats()?.heads.count);
    Ok(())
}

/// Per-id streams see exactly their own chain, in insertion order.
#[test]
fn per_id_streams_partition_the_history() -> vtree::Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let tree = open_tree("churn");

    let mut next = [1u64, 1, 1];
    let base = [100u64, 200, 300];

    for _ in 0..30 {
        let doc = rng.random_range(0..3usize);
        let k = next[doc];
        next[doc] = k + 1;

        let id = ["a", "b", "c"][doc];
        let mut item = Item::new(id, vn(base[doc] + k));
        if k > 1 {
            item = item.parent(vn(base[doc] + k - 1));
        }
        tree.write(item)?;
    }
    tree.drain()?;

    let mut total = 0;
    for (doc, id) in ["a", "b", "c"].iter().enumerate() {
        let versions: Vec<_> = tree
            .read_stream(ReadStreamOpts::new().id(*id))?
            .map(|entry| entry.unwrap().item.unwrap().header.version)
            .collect();

        let expected: Vec<_> = (1..next[doc]).map(|k| vn(base[doc] + k)).collect();
        assert_eq!(expected, versions);
        total += versions.len();
    }

    assert_eq!(30, total);
    Ok(())
}
