mod common;

use bee_tree::{Config, Feed, MemoryFeed};
use common::{check_arity, check_reference_validity, collect_all};
use test_log::test;

#[test]
fn batch_is_invisible_until_flush() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    tree.put("a", "1")?;

    let mut batch = tree.batch();
    batch.put("b", "2")?;
    batch.put("c", "3")?;

    // Staged mutations observe each other...
    assert_eq!(b"2", &*batch.get("b")?.expect("staged").value);

    // ...but are invisible outside the batch
    assert_eq!(None, tree.get("b")?);
    assert_eq!(2, feed.len());

    batch.flush()?;

    assert_eq!(4, feed.len());
    assert_eq!(b"2", &*tree.get("b")?.expect("flushed").value);
    assert_eq!(b"3", &*tree.get("c")?.expect("flushed").value);

    Ok(())
}

#[test]
fn batch_appends_one_block_per_mutation() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    let mut batch = tree.batch();
    for i in 0..10 {
        batch.put(format!("{i:02}"), "v")?;
    }
    batch.flush()?;

    // Header plus one block per mutation, appended in one go
    assert_eq!(11, feed.len());
    assert_eq!(11, tree.version());

    check_reference_validity(&feed);
    check_arity(&feed, tree.version());

    Ok(())
}

#[test]
fn batch_matches_individual_operations() -> bee_tree::Result<()> {
    let batched_feed = MemoryFeed::new();
    let batched = Config::new(batched_feed.clone()).open()?;

    let individual_feed = MemoryFeed::new();
    let individual = Config::new(individual_feed.clone()).open()?;

    let ops: Vec<(String, Option<String>)> = (0..40)
        .map(|i| (format!("{:02}", (i * 7) % 30), Some(format!("v{i}"))))
        .chain([("07".into(), None), ("14".into(), None)])
        .collect();

    let mut batch = batched.batch();
    for (key, value) in &ops {
        match value {
            Some(value) => batch.put(key, value)?,
            None => batch.delete(key)?,
        }
    }
    batch.flush()?;

    for (key, value) in &ops {
        match value {
            Some(value) => individual.put(key, value)?,
            None => individual.delete(key)?,
        }
    }

    assert_eq!(individual_feed.len(), batched_feed.len());
    assert_eq!(collect_all(&individual), collect_all(&batched));

    check_reference_validity(&batched_feed);
    check_arity(&batched_feed, batched.version());

    Ok(())
}

#[test]
fn batch_stages_delete_and_replace() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    tree.put("a", "1")?;
    tree.put("b", "1")?;

    let mut batch = tree.batch();
    batch.put("a", "2")?;
    batch.delete("b")?;
    batch.put("c", "3")?;

    assert_eq!(None, batch.get("b")?);
    batch.flush()?;

    assert_eq!(b"2", &*tree.get("a")?.expect("replaced").value);
    assert_eq!(None, tree.get("b")?);
    assert_eq!(b"3", &*tree.get("c")?.expect("new").value);

    Ok(())
}

#[test]
fn batch_flush_is_reusable() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    let mut batch = tree.batch();
    batch.put("a", "1")?;
    batch.flush()?;

    // Flushing again appends nothing
    batch.flush()?;
    assert_eq!(2, feed.len());

    // The same batch binds to the new feed state for its next round
    batch.put("b", "2")?;
    batch.flush()?;

    assert_eq!(3, feed.len());
    assert_eq!(b"2", &*tree.get("b")?.expect("second round").value);

    Ok(())
}

#[test]
fn batches_opened_concurrently_flush_in_turn() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    // Both batches exist before either flushes; each binds its view lazily
    // at its first operation
    let mut a = tree.batch();
    let mut b = tree.batch();

    a.put("x", "1")?;
    a.put("y", "1")?;
    a.flush()?;

    b.put("x", "2")?;
    b.put("y", "2")?;
    b.flush()?;

    assert_eq!(b"2", &*tree.get("x")?.expect("last writer").value);
    assert_eq!(b"2", &*tree.get("y")?.expect("last writer").value);

    // Header + 2 blocks per batch
    assert_eq!(5, feed.len());

    check_reference_validity(&feed);
    check_arity(&feed, tree.version());

    Ok(())
}

#[test]
fn batch_dropped_without_flush_discards_staged_state() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    {
        let mut batch = tree.batch();
        batch.put("a", "1")?;
    }

    assert_eq!(1, feed.len());
    assert_eq!(None, tree.get("a")?);

    Ok(())
}

#[test]
fn batch_intermediate_roots_are_compacted() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    let mut batch = tree.batch();
    batch.put("a", "1")?;
    batch.put("b", "2")?;
    batch.put("c", "3")?;
    batch.flush()?;

    // Each intermediate block re-published the whole (single-leaf) tree; its
    // superseded root cells are dropped at flush, leaving empty indexes
    assert!(common::decode_index(&feed, 1).levels.is_empty());
    assert!(common::decode_index(&feed, 2).levels.is_empty());

    // Only the final block publishes a root
    let last = common::decode_index(&feed, 3);
    assert_eq!(1, last.levels.len());
    assert_eq!(vec![1, 2, 3], last.levels[0].keys);

    check_reference_validity(&feed);

    Ok(())
}
