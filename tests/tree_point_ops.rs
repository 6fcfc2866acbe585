use bee_tree::{coding::Decode, Block, Config, Feed, MemoryFeed, YoloIndex};
use test_log::test;

#[test]
fn tree_put_then_get() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    tree.put("a", "1")?;

    let entry = tree.get("a")?.expect("should exist");
    assert_eq!(1, entry.seq);
    assert_eq!(b"a", &*entry.key);
    assert_eq!(b"1", &*entry.value);
    assert_eq!(2, tree.version());

    Ok(())
}

#[test]
fn tree_get_missing() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    assert_eq!(None, tree.get("a")?);

    tree.put("b", "1")?;
    assert_eq!(None, tree.get("a")?);
    assert_eq!(None, tree.get("c")?);

    Ok(())
}

#[test]
fn tree_replace_in_place() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    tree.put("a", "1")?;
    tree.put("a", "2")?;

    let entry = tree.get("a")?.expect("should exist");
    assert_eq!(2, entry.seq);
    assert_eq!(b"2", &*entry.value);
    assert_eq!(3, tree.version());

    // No structural growth: the new block re-indexes a single root leaf
    // whose only key reference moved to this block
    let block = Block::decode_from(&mut &*feed.get(2)?)?;
    let index = YoloIndex::decode_from(&mut &*block.index)?;

    assert_eq!(1, index.levels.len());
    let root = index.levels.first().expect("root level");
    assert_eq!(vec![2], root.keys);
    assert!(root.children.is_empty());

    Ok(())
}

#[test]
fn tree_put_is_idempotent() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    for key in ["a", "b", "c"] {
        tree.put(key, "x")?;
    }

    tree.put("b", "x")?;

    // A block is appended either way, but the observable map is unchanged
    assert_eq!(5, tree.version());
    for key in ["a", "b", "c"] {
        assert_eq!(b"x", &*tree.get(key)?.expect("should exist").value);
    }

    Ok(())
}

#[test]
fn tree_delete() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    tree.put("a", "1")?;
    tree.put("b", "2")?;
    tree.delete("a")?;

    assert_eq!(None, tree.get("a")?);
    assert_eq!(b"2", &*tree.get("b")?.expect("should exist").value);

    Ok(())
}

#[test]
fn tree_delete_emits_tombstone() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    tree.put("a", "1")?;
    tree.delete("a")?;

    let block = Block::decode_from(&mut &*feed.get(2)?)?;
    assert_eq!(b"a", &*block.key);
    assert_eq!(None, block.value);

    Ok(())
}

#[test]
fn tree_delete_missing_is_a_no_op() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    tree.put("a", "1")?;
    let len = feed.len();

    tree.delete("zzz")?;

    // Nothing was appended
    assert_eq!(len, feed.len());
    assert_eq!(b"1", &*tree.get("a")?.expect("should exist").value);

    Ok(())
}

#[test]
fn tree_delete_last_key_empties_tree() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    tree.put("a", "1")?;
    tree.delete("a")?;

    assert_eq!(None, tree.get("a")?);
    assert_eq!(0, tree.iter().count());

    // The tree stays usable
    tree.put("a", "2")?;
    assert_eq!(b"2", &*tree.get("a")?.expect("should exist").value);

    Ok(())
}

#[test]
fn tree_keys_are_raw_bytes() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    // Not UTF-8, and sorts above every ASCII key
    let high = [0xffu8, 0x00, 0xfe];

    tree.put(high, "high")?;
    tree.put("a", "low")?;

    assert_eq!(b"high", &*tree.get(high)?.expect("should exist").value);

    let last = tree.iter().last().expect("tree is non-empty")?;
    assert_eq!(high, &*last.key);

    Ok(())
}
