// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    batch::Batch,
    entry::Entry,
    feed::Feed,
    node::NodeRef,
    tree::Tree,
    Slice,
};
use std::ops::Bound;

/// Cursor position inside one node.
///
/// For an internal node with `n` keys, slots `0..=2n` alternate between
/// child positions (even) and key positions (odd); a leaf only has key
/// slots `0..n`. Signed so a reverse scan can run off the front.
struct Frame {
    node: NodeRef,
    slot: i64,
}

/// Lazy cursor over a pinned snapshot of the tree, in key order.
///
/// The snapshot root is resolved on the first [`Iterator::next`] call, and
/// stays pinned for the lifetime of the iterator regardless of concurrent
/// writes. An error ends the iteration.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Range<'a, F: Feed> {
    batch: Batch<'a, F>,
    start: Bound<Slice>,
    end: Bound<Slice>,
    reverse: bool,
    stack: Vec<Frame>,
    initialized: bool,
    done: bool,
}

impl<'a, F: Feed> Range<'a, F> {
    pub(crate) fn new(tree: &'a Tree<F>, start: Bound<Slice>, end: Bound<Slice>) -> Self {
        Self {
            batch: Batch::new(tree, false),
            start,
            end,
            reverse: false,
            stack: Vec::new(),
            initialized: false,
            done: false,
        }
    }

    /// Flips the scan direction.
    ///
    /// # Panics
    ///
    /// Panics if iteration has already started.
    #[must_use]
    pub fn rev(mut self) -> Self {
        assert!(!self.initialized, "cannot reverse a started range");
        self.reverse = true;
        self
    }

    /// First slot to visit in `node` when entering it without a seek bound.
    fn entry_slot(&self, node: &NodeRef) -> i64 {
        if self.reverse {
            let inner = node.borrow();
            let key_count = inner.keys.len() as i64;
            if inner.is_leaf() {
                key_count - 1
            } else {
                2 * key_count
            }
        } else {
            0
        }
    }

    fn init(&mut self) -> crate::Result<()> {
        let Some(root) = self.batch.root_node()? else {
            return Ok(());
        };

        let bound = if self.reverse {
            self.end.clone()
        } else {
            self.start.clone()
        };

        let (key, included) = match bound {
            Bound::Unbounded => {
                let slot = self.entry_slot(&root);
                self.stack.push(Frame { node: root, slot });
                return Ok(());
            }
            Bound::Included(key) => (key, true),
            Bound::Excluded(key) => (key, false),
        };

        if self.reverse {
            self.seek_back(root, &key, included)
        } else {
            self.seek_front(root, &key, included)
        }
    }

    /// Seeds the stack so the first yielded key is the smallest one at or
    /// after the lower bound.
    fn seek_front(&mut self, root: NodeRef, key: &Slice, included: bool) -> crate::Result<()> {
        let mut node = root;

        loop {
            let result = node.borrow_mut().find(key, &mut self.batch)?;

            if node.borrow().is_leaf() {
                let slot = match result {
                    Ok(i) if included => i as i64,
                    Ok(i) => i as i64 + 1,
                    Err(i) => i as i64,
                };
                self.stack.push(Frame { node, slot });
                return Ok(());
            }

            match result {
                Ok(i) if included => {
                    self.stack.push(Frame {
                        node,
                        slot: 2 * i as i64 + 1,
                    });
                    return Ok(());
                }
                Ok(i) => {
                    self.stack.push(Frame {
                        node,
                        slot: 2 * i as i64 + 2,
                    });
                    return Ok(());
                }
                Err(i) => {
                    // Resume at the key right of child i once that subtree
                    // is exhausted, and keep seeking inside it
                    let next = node.borrow_mut().child_node(i, &mut self.batch)?;
                    self.stack.push(Frame {
                        node,
                        slot: 2 * i as i64 + 1,
                    });
                    node = next;
                }
            }
        }
    }

    /// Seeds the stack so the first yielded key is the largest one at or
    /// before the upper bound.
    fn seek_back(&mut self, root: NodeRef, key: &Slice, included: bool) -> crate::Result<()> {
        let mut node = root;

        loop {
            let result = node.borrow_mut().find(key, &mut self.batch)?;

            if node.borrow().is_leaf() {
                let slot = match result {
                    Ok(i) if included => i as i64,
                    Ok(i) | Err(i) => i as i64 - 1,
                };
                self.stack.push(Frame { node, slot });
                return Ok(());
            }

            match result {
                Ok(i) if included => {
                    self.stack.push(Frame {
                        node,
                        slot: 2 * i as i64 + 1,
                    });
                    return Ok(());
                }
                Ok(i) => {
                    self.stack.push(Frame {
                        node,
                        slot: 2 * i as i64,
                    });
                    return Ok(());
                }
                Err(i) => {
                    let next = node.borrow_mut().child_node(i, &mut self.batch)?;
                    self.stack.push(Frame {
                        node,
                        slot: 2 * i as i64 - 1,
                    });
                    node = next;
                }
            }
        }
    }

    fn past_bound(&self, key: &Slice) -> bool {
        if self.reverse {
            match &self.start {
                Bound::Unbounded => false,
                Bound::Included(bound) => key < bound,
                Bound::Excluded(bound) => key <= bound,
            }
        } else {
            match &self.end {
                Bound::Unbounded => false,
                Bound::Included(bound) => key > bound,
                Bound::Excluded(bound) => key >= bound,
            }
        }
    }

    fn advance(&mut self) -> crate::Result<Option<Entry>> {
        if !self.initialized {
            self.initialized = true;
            self.init()?;
        }

        loop {
            let Some(top) = self.stack.last() else {
                return Ok(None);
            };
            let node = top.node.clone();
            let slot = top.slot;

            let (is_leaf, key_count) = {
                let inner = node.borrow();
                (inner.is_leaf(), inner.keys.len() as i64)
            };
            let max_slot = if is_leaf { key_count - 1 } else { 2 * key_count };

            if slot < 0 || slot > max_slot {
                self.stack.pop();
                continue;
            }

            {
                let top = self.stack.last_mut().expect("frame exists");
                top.slot += if self.reverse { -1 } else { 1 };
            }

            let key_index = if is_leaf {
                slot as usize
            } else if slot % 2 == 1 {
                ((slot - 1) / 2) as usize
            } else {
                // Child slot: descend
                let child = node
                    .borrow_mut()
                    .child_node((slot / 2) as usize, &mut self.batch)?;
                let child_slot = self.entry_slot(&child);
                self.stack.push(Frame {
                    node: child,
                    slot: child_slot,
                });
                continue;
            };

            let key_bytes = node.borrow_mut().key_bytes(key_index, &mut self.batch)?;
            if self.past_bound(&key_bytes) {
                self.stack.clear();
                return Ok(None);
            }

            let seq = node.borrow().keys.get(key_index).expect("slot is in bounds").seq;
            return self.batch.entry_at(seq).map(Some);
        }
    }
}

impl<F: Feed> Iterator for Range<'_, F> {
    type Item = crate::Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
