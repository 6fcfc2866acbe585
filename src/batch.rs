// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    block::{Block, BlockEntry},
    coding::{Decode, Encode},
    entry::Entry,
    feed::Feed,
    node::{self, Child, KeyRef, NodeRef, NodeSource, TreeNode, MIN_KEYS},
    tree::Tree,
    Error, Slice,
};
use rustc_hash::FxHashMap;
use std::{cell::RefCell, rc::Rc, sync::Arc};

/// A staged, not-yet-appended block.
pub(crate) struct BatchEntry {
    key: Slice,
    value: Option<Slice>,

    /// Live cells of the block's index, shared with the node graph. A later
    /// mutation that re-homes one of these nodes is thereby visible here.
    cells: Vec<Option<NodeRef>>,

    /// Filled by the first flush attempt, so a retried flush cannot compact
    /// twice.
    encoded: Option<Slice>,
}

impl BatchEntry {
    /// Encodes this staged block, first compacting cells that later staged
    /// blocks have taken over - unless this is the batch's final block, whose
    /// index is the published root and stays complete.
    fn encode_block(&mut self, seq: u64, is_last: bool) -> Slice {
        if let Some(bytes) = &self.encoded {
            return bytes.clone();
        }

        if !is_last {
            compact_cells(&mut self.cells, seq);
        }

        let block = Block {
            index: node::deflate(&self.cells).encode_into_vec().into(),
            key: self.key.clone(),
            value: self.value.clone(),
        };

        let bytes: Slice = block.encode_into_vec().into();
        self.encoded = Some(bytes.clone());
        bytes
    }
}

/// Drops cells that later staged blocks have taken over and renumbers the
/// survivors compactly.
///
/// An intermediate root is never externally visible, so slot 0 always goes;
/// any other node either still lives here (its home seq is this block) or has
/// been re-published by a later block in the same batch.
fn compact_cells(cells: &mut Vec<Option<NodeRef>>, seq: u64) {
    if let Some(root_cell) = cells.first_mut() {
        *root_cell = None;
    }

    let mut i = 0;
    while i < cells.len() {
        let survivor = match cells.get(i).and_then(Option::as_ref) {
            Some(node) if node.borrow().home.map(|(home_seq, _)| home_seq) == Some(seq) => {
                Some(node.clone())
            }
            _ => None,
        };

        match survivor {
            Some(node) => {
                node.borrow_mut().home = Some((seq, i as u64));
                i += 1;
            }
            None => {
                // Swap-pop; the swapped-in cell is examined next
                cells.swap_remove(i);
            }
        }
    }
}

enum Slot {
    Stored(Arc<BlockEntry>),
    Pending(BatchEntry),
}

/// A unit of one or more mutations sharing one view of the root.
///
/// Single-shot [`Tree`] operations run through an auto-flushing batch that
/// appends every mutation immediately. An explicit [`Tree::batch`] instead
/// stages mutations in memory; they observe each other but stay invisible to
/// the outside until [`Batch::flush`] appends them in one atomic feed append.
///
/// Dropping an unflushed batch discards its staged mutations.
pub struct Batch<'a, F: Feed> {
    tree: &'a Tree<F>,
    auto_flush: bool,

    /// Virtual feed length: blocks in the feed plus staged entries. Zero
    /// until the first operation binds the batch to the feed.
    length: u64,

    root: Option<NodeRef>,
    blocks: FxHashMap<u64, Slot>,

    /// Armed at the start of a lookup, fired on the first fetch that has to
    /// go to the feed.
    hint: Option<(u64, Slice)>,
}

impl<'a, F: Feed> Batch<'a, F> {
    pub(crate) fn new(tree: &'a Tree<F>, auto_flush: bool) -> Self {
        Self {
            tree,
            auto_flush,
            length: 0,
            root: None,
            blocks: FxHashMap::default(),
            hint: None,
        }
    }

    /// Binds the batch to the feed: ensures the header, refreshes passive
    /// readers, and snapshots the virtual length. Later operations in the
    /// batch keep this view.
    fn bind(&mut self) -> crate::Result<()> {
        if self.length > 0 {
            return Ok(());
        }

        self.tree.ready()?;

        if self.tree.pinned().is_none() && !self.tree.feed().writable() {
            // Best-effort refresh for passive readers
            let _ = self.tree.feed().update();
        }

        self.length = self.tree.version();
        Ok(())
    }

    fn ensure_writable(&self) -> crate::Result<()> {
        if self.tree.pinned().is_some() || !self.tree.feed().writable() {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Root of the batch's snapshot; `None` for an empty tree.
    pub(crate) fn root_node(&mut self) -> crate::Result<Option<NodeRef>> {
        if let Some(root) = &self.root {
            return Ok(Some(root.clone()));
        }

        self.bind()?;

        if self.length < 2 {
            return Ok(None);
        }

        let root = self.node_at(self.length - 1, 0)?;
        self.root = Some(root.clone());
        Ok(Some(root))
    }

    /// Fetches and hydrates a stored block, going through the handle's block
    /// cache.
    fn fetch(&mut self, seq: u64) -> crate::Result<Arc<BlockEntry>> {
        if let Some(entry) = self.tree.cached_block(seq) {
            return Ok(entry);
        }

        if let Some((head, key)) = self.hint.take() {
            if let Some(extension) = self.tree.extension() {
                extension.get(head, &key);
            }
        }

        let bytes = self.tree.feed().get(seq)?;
        let block = Block::decode_from(&mut &bytes[..])?;
        let entry = Arc::new(BlockEntry::new(seq, block));
        self.tree.cache_block(seq, entry.clone());
        Ok(entry)
    }

    /// Key and value of the block at `seq`, staged or stored.
    pub(crate) fn block_payload(&mut self, seq: u64) -> crate::Result<(Slice, Option<Slice>)> {
        if let Some(slot) = self.blocks.get(&seq) {
            return Ok(match slot {
                Slot::Stored(entry) => (entry.key().clone(), entry.value().cloned()),
                Slot::Pending(entry) => (entry.key.clone(), entry.value.clone()),
            });
        }

        let entry = self.fetch(seq)?;
        let payload = (entry.key().clone(), entry.value().cloned());
        self.blocks.insert(seq, Slot::Stored(entry));
        Ok(payload)
    }

    /// Decoded entry for the block at `seq`.
    pub(crate) fn entry_at(&mut self, seq: u64) -> crate::Result<Entry> {
        let (raw_key, raw_value) = self.block_payload(seq)?;

        let value = raw_value.ok_or(Error::Corrupted("key reference resolved to a tombstone"))?;

        Ok(Entry {
            seq,
            key: self.tree.decode_key(&raw_key)?,
            value: self.tree.decode_value(&value)?,
        })
    }

    /// Point lookup against the batch's snapshot.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a block fetch or decode fails.
    pub fn get<K: AsRef<[u8]>>(&mut self, key: K) -> crate::Result<Option<Entry>> {
        let key = self.tree.encode_key(key.as_ref());

        self.bind()?;
        self.hint = Some((self.length.saturating_sub(1), key.clone()));
        let result = self.lookup(&key);
        self.hint = None;

        result
    }

    fn lookup(&mut self, key: &Slice) -> crate::Result<Option<Entry>> {
        let Some(mut node) = self.root_node()? else {
            return Ok(None);
        };

        loop {
            let result = node.borrow_mut().find(key, self)?;

            match result {
                Ok(i) => {
                    let seq = node.borrow().keys.get(i).expect("hit is in bounds").seq;
                    return self.entry_at(seq).map(Some);
                }
                Err(i) => {
                    let next = {
                        let mut inner = node.borrow_mut();
                        if inner.is_leaf() {
                            return Ok(None);
                        }
                        inner.child_node(i, self)?
                    };
                    node = next;
                }
            }
        }
    }

    /// Inserts `key` → `value`, staging (or appending) exactly one block.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the handle is read-only or a block fetch, decode
    /// or append fails. On error, nothing has been appended.
    pub fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&mut self, key: K, value: V) -> crate::Result<()> {
        self.ensure_writable()?;

        let key = self.tree.encode_key(key.as_ref());
        let value = self.tree.encode_value(value.as_ref());

        self.bind()?;
        let seq = self.length;
        let target = KeyRef::with_bytes(seq, key.clone());

        let mut node = match self.root_node()? {
            Some(root) => root,
            None => TreeNode::create(),
        };
        let mut root = node.clone();
        let mut stack: Vec<NodeRef> = Vec::new();

        loop {
            if node.borrow().is_leaf() {
                break;
            }

            stack.push(node.clone());

            // The whole descended spine re-emits with this block even when
            // the shape stays put; unchanged subtree references still
            // compress to their old addresses.
            node.borrow_mut().changed = true;

            let result = node.borrow_mut().find(&key, self)?;
            match result {
                Ok(i) => {
                    // Exact hit on an internal node: swap the reference, done
                    *node.borrow_mut().keys.get_mut(i).expect("hit is in bounds") = target;
                    return self.append_block(root, seq, key, Some(value));
                }
                Err(i) => {
                    let next = node.borrow_mut().child_node(i, self)?;
                    node = next;
                }
            }
        }

        let mut fits = node.borrow_mut().insert_key(target, None, self)?;

        while !fits {
            let (median, right) = node.borrow_mut().split(self)?;

            match stack.pop() {
                Some(parent) => {
                    fits = parent.borrow_mut().insert_key(median, Some(right), self)?;
                    node = parent;
                }
                None => {
                    // The root itself split; the tree grows one level
                    let new_root = TreeNode::create();
                    {
                        let mut inner = new_root.borrow_mut();
                        inner.changed = true;
                        inner.keys.push(median);
                        inner.children.push(Child::fresh(node.clone()));
                        inner.children.push(Child::fresh(right));
                    }
                    root = new_root;
                    fits = true;
                }
            }
        }

        self.append_block(root, seq, key, Some(value))
    }

    /// Deletes `key`, staging (or appending) one tombstone block.
    ///
    /// Deleting a key that does not exist appends nothing at all.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the handle is read-only or a block fetch, decode
    /// or append fails. On error, nothing has been appended.
    pub fn delete<K: AsRef<[u8]>>(&mut self, key: K) -> crate::Result<()> {
        self.ensure_writable()?;

        let key = self.tree.encode_key(key.as_ref());

        self.bind()?;
        let seq = self.length;

        let Some(mut node) = self.root_node()? else {
            return Ok(());
        };
        let mut stack: Vec<NodeRef> = Vec::new();

        loop {
            stack.push(node.clone());

            let result = node.borrow_mut().find(&key, self)?;
            match result {
                Ok(i) => {
                    if node.borrow().is_leaf() {
                        node.borrow_mut().remove_key(i);
                    } else {
                        self.swap_with_nearest_leaf(&node, i, &mut stack)?;
                    }

                    // Only a successful removal rewrites the spine; a missed
                    // delete has already returned by now
                    for touched in &stack {
                        touched.borrow_mut().changed = true;
                    }
                    break;
                }
                Err(i) => {
                    let next = {
                        let mut inner = node.borrow_mut();
                        if inner.is_leaf() {
                            return Ok(());
                        }
                        inner.child_node(i, self)?
                    };
                    node = next;
                }
            }
        }

        self.rebalance(&mut stack)?;

        let root = stack.first().expect("stack holds the root").clone();
        let root = {
            let shrink = {
                let inner = root.borrow();
                inner.keys.is_empty() && !inner.children.is_empty()
            };
            if shrink {
                // The last separator merged away; the tree loses one level
                root.borrow_mut().child_node(0, self)?
            } else {
                root
            }
        };

        self.append_block(root, seq, key, None)
    }

    /// Replaces the separator `keys[i]` of `node` with the adjacent key of
    /// the nearest leaf, taken from the larger of the two subtrees flanking
    /// the separator, and removes that key from its leaf.
    ///
    /// The chosen path is pushed onto `stack` so the leaf (which may now be
    /// underfull) takes part in rebalancing.
    fn swap_with_nearest_leaf(
        &mut self,
        node: &NodeRef,
        i: usize,
        stack: &mut Vec<NodeRef>,
    ) -> crate::Result<()> {
        let left = node.borrow_mut().child_node(i, self)?;
        let right = node.borrow_mut().child_node(i + 1, self)?;

        // Both probes run to completion before the comparison
        let left_size = self.leaf_size(&left, true)?;
        let right_size = self.leaf_size(&right, false)?;

        if right_size < left_size {
            let leaf = self.descend(&left, true, stack)?;
            let last = leaf.borrow().keys.len() - 1;
            let replacement = leaf.borrow().keys.get(last).expect("leaf is non-empty").clone();
            *node.borrow_mut().keys.get_mut(i).expect("separator is in bounds") = replacement;
            leaf.borrow_mut().remove_key(last);
        } else {
            // Ties land here
            let leaf = self.descend(&right, false, stack)?;
            let replacement = leaf.borrow().keys.first().expect("leaf is non-empty").clone();
            *node.borrow_mut().keys.get_mut(i).expect("separator is in bounds") = replacement;
            leaf.borrow_mut().remove_key(0);
        }

        Ok(())
    }

    /// Walks to the outermost leaf under `start`, pushing the path (leaf
    /// included) onto `stack`.
    fn descend(
        &mut self,
        start: &NodeRef,
        rightmost: bool,
        stack: &mut Vec<NodeRef>,
    ) -> crate::Result<NodeRef> {
        let mut current = start.clone();

        loop {
            stack.push(current.clone());

            let next = {
                let mut inner = current.borrow_mut();
                if inner.is_leaf() {
                    break;
                }
                let i = if rightmost { inner.children.len() - 1 } else { 0 };
                inner.child_node(i, self)?
            };
            current = next;
        }

        Ok(current)
    }

    /// Key count of the outermost leaf under `start`.
    fn leaf_size(&mut self, start: &NodeRef, rightmost: bool) -> crate::Result<usize> {
        let mut current = start.clone();

        loop {
            let next = {
                let mut inner = current.borrow_mut();
                if inner.is_leaf() {
                    return Ok(inner.keys.len());
                }
                let i = if rightmost { inner.children.len() - 1 } else { 0 };
                inner.child_node(i, self)?
            };
            current = next;
        }
    }

    /// Bottom-up rebalance after a removal: borrow from a sibling where
    /// possible, merge otherwise and continue one level up.
    fn rebalance(&mut self, stack: &mut Vec<NodeRef>) -> crate::Result<()> {
        while stack.len() > 1 {
            let node = stack.pop().expect("stack is non-empty");
            if node.borrow().keys.len() >= MIN_KEYS {
                return Ok(());
            }

            let parent = stack.last().expect("parent is below on the stack").clone();
            let index = parent
                .borrow()
                .children
                .iter()
                .position(|child| {
                    child
                        .node
                        .as_ref()
                        .is_some_and(|candidate| Rc::ptr_eq(candidate, &node))
                })
                .expect("child not found in parent");

            let left = if index > 0 {
                Some(parent.borrow_mut().child_node(index - 1, self)?)
            } else {
                None
            };
            let right = if index + 1 < parent.borrow().children.len() {
                Some(parent.borrow_mut().child_node(index + 1, self)?)
            } else {
                None
            };

            if let Some(left) = &left {
                if left.borrow().keys.len() > MIN_KEYS {
                    // Rotate right through the parent separator
                    let separator = parent
                        .borrow()
                        .keys
                        .get(index - 1)
                        .expect("separator left of child")
                        .clone();
                    {
                        let mut inner = node.borrow_mut();
                        let mut donor = left.borrow_mut();

                        inner.keys.insert(0, separator);
                        if let Some(child) = donor.children.pop() {
                            inner.children.insert(0, child);
                        }

                        *parent
                            .borrow_mut()
                            .keys
                            .get_mut(index - 1)
                            .expect("separator left of child") =
                            donor.keys.pop().expect("donor has spare keys");
                        donor.changed = true;
                    }
                    return Ok(());
                }
            }

            if let Some(right) = &right {
                if right.borrow().keys.len() > MIN_KEYS {
                    // Rotate left
                    let separator = parent
                        .borrow()
                        .keys
                        .get(index)
                        .expect("separator right of child")
                        .clone();
                    {
                        let mut inner = node.borrow_mut();
                        let mut donor = right.borrow_mut();

                        inner.keys.push(separator);
                        if !donor.children.is_empty() {
                            inner.children.push(donor.children.remove(0));
                        }

                        *parent
                            .borrow_mut()
                            .keys
                            .get_mut(index)
                            .expect("separator right of child") = donor.keys.remove(0);
                        donor.changed = true;
                    }
                    return Ok(());
                }
            }

            // No donor on either side: merge through the separator and keep
            // rebalancing one level up
            if let Some(left) = left {
                let separator = parent
                    .borrow()
                    .keys
                    .get(index - 1)
                    .expect("separator left of child")
                    .clone();
                left.borrow_mut().merge(&mut node.borrow_mut(), separator);
                parent.borrow_mut().remove_key(index - 1);
            } else {
                let right = right.expect("underfull node has at least one sibling");
                let separator = parent
                    .borrow()
                    .keys
                    .get(index)
                    .expect("separator right of child")
                    .clone();
                node.borrow_mut().merge(&mut right.borrow_mut(), separator);
                parent.borrow_mut().remove_key(index);
            }
        }

        Ok(())
    }

    /// Emits one block for a finished mutation: serialize the changed spine,
    /// then append (auto-flush) or stage it.
    fn append_block(
        &mut self,
        root: NodeRef,
        seq: u64,
        key: Slice,
        value: Option<Slice>,
    ) -> crate::Result<()> {
        let mut cells = Vec::new();
        node::index_changes(&root, &mut cells, seq);

        if self.auto_flush {
            let block = Block {
                index: node::deflate(&cells).encode_into_vec().into(),
                key,
                value,
            };
            self.tree.feed().append(&[block.encode_into_vec().into()])?;

            // The writer has this block locally; spare readers the re-fetch
            self.tree.cache_block(seq, Arc::new(BlockEntry::new(seq, block)));
            log::trace!("appended block {seq}");
        } else {
            self.blocks.insert(
                seq,
                Slot::Pending(BatchEntry {
                    key,
                    value,
                    cells,
                    encoded: None,
                }),
            );
            log::trace!("staged block {seq}");
        }

        self.root = Some(root);
        self.length += 1;
        Ok(())
    }

    /// Appends all staged blocks in one atomic feed append, then resets the
    /// batch for reuse.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the append fails; the staged state is kept so the
    /// flush can be retried.
    pub fn flush(&mut self) -> crate::Result<()> {
        if self.auto_flush {
            return Ok(());
        }

        let base = self.tree.feed().len();
        if self.length <= base {
            return Ok(());
        }

        // NOTE: Staged blocks are held in memory, so this fits
        #[allow(clippy::cast_possible_truncation)]
        let count = (self.length - base) as usize;
        let mut batch = Vec::with_capacity(count);

        for i in 0..count {
            let seq = base + i as u64;
            let Some(Slot::Pending(entry)) = self.blocks.get_mut(&seq) else {
                return Err(Error::Corrupted("staged block missing from batch"));
            };
            batch.push(entry.encode_block(seq, i == count - 1));
        }

        self.tree.feed().append(&batch)?;
        log::trace!("flushed {count} staged blocks at {base}");

        self.root = None;
        self.blocks.clear();
        self.length = 0;
        Ok(())
    }
}

impl<F: Feed> NodeSource for Batch<'_, F> {
    fn key_bytes(&mut self, seq: u64) -> crate::Result<Slice> {
        Ok(self.block_payload(seq)?.0)
    }

    fn node_at(&mut self, seq: u64, offset: u64) -> crate::Result<NodeRef> {
        if let Some(slot) = self.blocks.get(&seq) {
            match slot {
                Slot::Pending(entry) => {
                    // NOTE: Cell lists are tiny
                    #[allow(clippy::cast_possible_truncation)]
                    let cell = entry
                        .cells
                        .get(offset as usize)
                        .and_then(Clone::clone)
                        .ok_or(Error::Corrupted("pending index cell out of range"))?;
                    return Ok(cell);
                }
                Slot::Stored(entry) => {
                    let node = entry.tree_node(offset)?;
                    return Ok(Rc::new(RefCell::new(node)));
                }
            }
        }

        let entry = self.fetch(seq)?;
        let node = entry.tree_node(offset)?;
        self.blocks.insert(seq, Slot::Stored(entry));
        Ok(Rc::new(RefCell::new(node)))
    }
}
