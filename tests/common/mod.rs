#![allow(dead_code)]

use bee_tree::{coding::Decode, Block, Feed, MemoryFeed, YoloIndex};

pub fn decode_block(feed: &MemoryFeed, seq: u64) -> Block {
    Block::decode_from(&mut &*feed.get(seq).unwrap()).unwrap()
}

pub fn decode_index(feed: &MemoryFeed, seq: u64) -> YoloIndex {
    let block = decode_block(feed, seq);
    YoloIndex::decode_from(&mut &*block.index).unwrap()
}

/// Every `(seq, offset)` reference in every published block points at the
/// block itself or one strictly earlier, and at an offset that exists in the
/// target block's index.
pub fn check_reference_validity(feed: &MemoryFeed) {
    for seq in 1..feed.len() {
        let index = decode_index(feed, seq);

        for level in &index.levels {
            for (child_seq, child_offset) in level.child_pairs() {
                assert!(
                    (1..=seq).contains(&child_seq),
                    "block {seq} references future or header block {child_seq}"
                );

                let target = if child_seq == seq {
                    index.clone()
                } else {
                    decode_index(feed, child_seq)
                };

                assert!(
                    (child_offset as usize) < target.levels.len(),
                    "block {seq} references ({child_seq}, {child_offset}) out of range"
                );
            }
        }
    }
}

/// Walks the tree published at `version`, checking B-tree arity invariants
/// (order 5: non-root nodes hold 4..=9 keys, internal nodes have exactly
/// one more child than keys).
pub fn check_arity(feed: &MemoryFeed, version: u64) {
    if version < 2 {
        return;
    }
    walk_arity(feed, version - 1, 0, true);
}

fn walk_arity(feed: &MemoryFeed, seq: u64, offset: u64, is_root: bool) {
    let index = decode_index(feed, seq);
    let level = &index.levels[offset as usize];

    let keys = level.keys.len();
    let children = level.children.len() / 2;

    assert!(keys <= 9, "node ({seq}, {offset}) holds {keys} keys");
    if !is_root {
        assert!(keys >= 4, "node ({seq}, {offset}) holds only {keys} keys");
    }
    if children > 0 {
        assert_eq!(
            keys + 1,
            children,
            "internal node ({seq}, {offset}) has {children} children for {keys} keys"
        );
    }

    for (child_seq, child_offset) in level.child_pairs() {
        walk_arity(feed, child_seq, child_offset, false);
    }
}

/// Collects `(key, value)` pairs of a full forward scan.
pub fn collect_all(tree: &bee_tree::Tree<MemoryFeed>) -> Vec<(Vec<u8>, Vec<u8>)> {
    tree.iter()
        .map(|item| {
            let entry = item.unwrap();
            (entry.key.to_vec(), entry.value.to_vec())
        })
        .collect()
}
