// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    index::{Level, YoloIndex},
    Slice,
};
use std::{cell::RefCell, rc::Rc};

/// B-tree branching constant.
const ORDER: usize = 5;

/// Minimum key count for any node but the root.
pub(crate) const MIN_KEYS: usize = ORDER - 1;

/// A node reaching this key count must be split.
pub(crate) const MAX_CHILDREN: usize = 2 * ORDER;

/// Shared handle to an in-memory node.
///
/// Nodes live only for the duration of a batch and are single-threaded by
/// contract, hence `Rc` over `Arc`.
pub(crate) type NodeRef = Rc<RefCell<TreeNode>>;

/// Resolves foreign blocks for lazy key and child dereferencing.
pub(crate) trait NodeSource {
    /// Key bytes of the block at `seq`.
    fn key_bytes(&mut self, seq: u64) -> crate::Result<Slice>;

    /// The node published at `(seq, offset)`.
    fn node_at(&mut self, seq: u64, offset: u64) -> crate::Result<NodeRef>;
}

/// Reference to the block whose own `key` field holds the key bytes.
#[derive(Clone)]
pub(crate) struct KeyRef {
    pub seq: u64,

    /// Write-once cache of the key bytes.
    pub bytes: Option<Slice>,
}

impl KeyRef {
    pub fn new(seq: u64) -> Self {
        Self { seq, bytes: None }
    }

    pub fn with_bytes(seq: u64, bytes: Slice) -> Self {
        Self {
            seq,
            bytes: Some(bytes),
        }
    }
}

/// Reference to a child node by the `(seq, offset)` of the cell publishing it.
#[derive(Clone)]
pub(crate) struct Child {
    pub seq: u64,
    pub offset: u64,

    /// Write-once cache of the hydrated node.
    pub node: Option<NodeRef>,
}

impl Child {
    pub fn reference(seq: u64, offset: u64) -> Self {
        Self {
            seq,
            offset,
            node: None,
        }
    }

    /// A freshly spliced child. Seq 0 is an in-memory placeholder only;
    /// fresh children are always changed, so `index_changes` renumbers them
    /// before anything is serialized.
    pub fn fresh(node: NodeRef) -> Self {
        Self {
            seq: 0,
            offset: 0,
            node: Some(node),
        }
    }

    /// Current address of the referenced node.
    ///
    /// A hydrated node may have been re-homed (or compacted) since this
    /// reference was written, so the node's own `home` wins over the stored
    /// pair.
    pub fn address(&self) -> (u64, u64) {
        match &self.node {
            Some(node) => node.borrow().home.unwrap_or((self.seq, self.offset)),
            None => (self.seq, self.offset),
        }
    }
}

/// In-memory view of a single B-tree node.
pub(crate) struct TreeNode {
    pub keys: Vec<KeyRef>,
    pub children: Vec<Child>,

    /// Set while the node differs from its last published form; drives the
    /// copy-on-write spine serialization.
    pub changed: bool,

    /// `(seq, offset)` of the block cell currently publishing this node;
    /// `None` until the node has been homed by [`index_changes`].
    pub home: Option<(u64, u64)>,
}

impl TreeNode {
    /// A fresh, empty, not-yet-homed leaf.
    pub fn create() -> NodeRef {
        Rc::new(RefCell::new(Self {
            keys: Vec::new(),
            children: Vec::new(),
            changed: false,
            home: None,
        }))
    }

    /// A node view over one level of a stored block's index.
    pub fn from_level(seq: u64, offset: u64, level: &Level) -> Self {
        Self {
            keys: level.keys.iter().map(|&seq| KeyRef::new(seq)).collect(),
            children: level
                .child_pairs()
                .map(|(seq, offset)| Child::reference(seq, offset))
                .collect(),
            changed: false,
            home: Some((seq, offset)),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Loads (and caches) the bytes of `keys[i]`.
    pub fn key_bytes(&mut self, i: usize, source: &mut dyn NodeSource) -> crate::Result<Slice> {
        let key = self.keys.get_mut(i).expect("key index out of bounds");

        if let Some(bytes) = &key.bytes {
            return Ok(bytes.clone());
        }

        let bytes = source.key_bytes(key.seq)?;
        key.bytes = Some(bytes.clone());
        Ok(bytes)
    }

    /// Resolves (and caches) the child node at `i`.
    pub fn child_node(&mut self, i: usize, source: &mut dyn NodeSource) -> crate::Result<NodeRef> {
        let child = self.children.get_mut(i).expect("child index out of bounds");

        if let Some(node) = &child.node {
            return Ok(node.clone());
        }

        let node = source.node_at(child.seq, child.offset)?;
        child.node = Some(node.clone());
        Ok(node)
    }

    /// Binary search for `key` within this node.
    ///
    /// Returns `Ok(i)` on an exact hit and `Err(i)` with the insertion index
    /// otherwise. The comparator is byte-lexicographic on the raw (encoded)
    /// key bytes; probes may fault foreign blocks in through `source`.
    pub fn find(
        &mut self,
        key: &[u8],
        source: &mut dyn NodeSource,
    ) -> crate::Result<std::result::Result<usize, usize>> {
        use std::cmp::Ordering::{Equal, Greater, Less};

        let mut low = 0;
        let mut high = self.keys.len();

        while low < high {
            let mid = (low + high) / 2;
            let probe = self.key_bytes(mid, source)?;

            match key.cmp(&probe) {
                Equal => return Ok(Ok(mid)),
                Less => high = mid,
                Greater => low = mid + 1,
            }
        }

        Ok(Err(low))
    }

    /// Inserts `key` into this node only.
    ///
    /// An exact match replaces the existing reference in place; the shape
    /// does not change, so no split can be needed. Otherwise the key (and,
    /// for post-split propagation, the right subtree) is spliced in at the
    /// insertion index.
    ///
    /// Returns `true` while the node remains within bounds; `false` means
    /// the caller must split.
    pub fn insert_key(
        &mut self,
        key: KeyRef,
        child: Option<NodeRef>,
        source: &mut dyn NodeSource,
    ) -> crate::Result<bool> {
        let probe = key.bytes.clone().expect("probe key must carry bytes");

        self.changed = true;

        match self.find(&probe, source)? {
            Ok(i) => {
                *self.keys.get_mut(i).expect("hit is in bounds") = key;
                Ok(true)
            }
            Err(i) => {
                self.keys.insert(i, key);
                if let Some(node) = child {
                    self.children.insert(i + 1, Child::fresh(node));
                }
                Ok(self.keys.len() < MAX_CHILDREN)
            }
        }
    }

    /// Removes `keys[i]`; on internal nodes, also drops the right-adjacent
    /// child pointer.
    pub fn remove_key(&mut self, i: usize) {
        self.keys.remove(i);
        if !self.children.is_empty() {
            self.children.remove(i + 1);
        }
        self.changed = true;
    }

    /// Splits an overflowed node, returning the median and the new right
    /// half.
    ///
    /// The median's bytes are loaded before it is detached: its home block
    /// may not end up adjacent to wherever the median lands next.
    pub fn split(&mut self, source: &mut dyn NodeSource) -> crate::Result<(KeyRef, NodeRef)> {
        let len = self.keys.len() >> 1;

        let right = Self::create();

        {
            let mut right = right.borrow_mut();
            right.changed = true;

            for _ in 0..len {
                right.keys.push(self.keys.pop().expect("split on underfull node"));
            }
            right.keys.reverse();

            if !self.children.is_empty() {
                for _ in 0..=len {
                    right
                        .children
                        .push(self.children.pop().expect("split on underfull node"));
                }
                right.children.reverse();
            }
        }

        self.key_bytes(self.keys.len() - 1, source)?;
        let median = self.keys.pop().expect("split on underfull node");

        self.changed = true;

        Ok((median, right))
    }

    /// Folds `median` and everything in `sibling` into this node.
    pub fn merge(&mut self, sibling: &mut Self, median: KeyRef) {
        self.changed = true;
        self.keys.push(median);
        self.keys.append(&mut sibling.keys);
        self.children.append(&mut sibling.children);
    }
}

/// Serializes the changed spine rooted at `node` into `cells`, returning the
/// offset reserved for `node` (0 for the root this is entered at).
///
/// Only children that are hydrated *and* changed recurse; everything else
/// keeps its original `(seq, offset)`. Renumbering anything more would
/// silently duplicate unchanged subtrees into every new block.
pub(crate) fn index_changes(node: &NodeRef, cells: &mut Vec<Option<NodeRef>>, seq: u64) -> u64 {
    let offset = cells.len() as u64;
    cells.push(Some(node.clone()));

    let mut inner = node.borrow_mut();
    inner.changed = false;
    inner.home = Some((seq, offset));

    for child in &mut inner.children {
        let Some(child_node) = child.node.clone() else {
            continue;
        };
        if !child_node.borrow().changed {
            continue;
        }

        let child_offset = index_changes(&child_node, cells, seq);
        child.seq = seq;
        child.offset = child_offset;
    }

    offset
}

/// Flattens assembled cells into the wire index.
pub(crate) fn deflate(cells: &[Option<NodeRef>]) -> YoloIndex {
    let levels = cells
        .iter()
        .map(|cell| {
            let cell = cell.as_ref().expect("assembled index holds no holes");
            let node = cell.borrow();

            Level {
                keys: node.keys.iter().map(|key| key.seq).collect(),
                children: node
                    .children
                    .iter()
                    .flat_map(|child| {
                        let (seq, offset) = child.address();
                        [seq, offset]
                    })
                    .collect(),
            }
        })
        .collect();

    YoloIndex { levels }
}
