// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{block::Block, coding::Decode, entry::Entry, feed::Feed, tree::Tree, Slice};

/// One replayed mutation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Change {
    /// An insert (or replace).
    Put(Entry),

    /// A deletion tombstone.
    Delete {
        /// Position of the tombstone block.
        seq: u64,

        /// Deleted key (after the key codec).
        key: Slice,
    },
}

impl Change {
    /// Position of the block this change was replayed from.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::Put(entry) => entry.seq,
            Self::Delete { seq, .. } => *seq,
        }
    }

    /// Key the change applies to.
    #[must_use]
    pub fn key(&self) -> &Slice {
        match self {
            Self::Put(entry) => &entry.key,
            Self::Delete { key, .. } => key,
        }
    }
}

/// Replays tree blocks in log order, one [`Change`] per block.
///
/// The replay window is `[since, version)`; it is pinned when iteration
/// starts.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct History<'a, F: Feed> {
    tree: &'a Tree<F>,
    since: u64,
    end: u64,
    cursor: u64,
    reverse: bool,
    initialized: bool,
    done: bool,
}

impl<'a, F: Feed> History<'a, F> {
    pub(crate) fn new(tree: &'a Tree<F>) -> Self {
        Self {
            tree,
            since: 1,
            end: 0,
            cursor: 0,
            reverse: false,
            initialized: false,
            done: false,
        }
    }

    /// Starts the replay at `version` instead of the beginning.
    #[must_use]
    pub fn since(mut self, version: u64) -> Self {
        self.since = version.max(1);
        self
    }

    /// Replays newest-first.
    ///
    /// # Panics
    ///
    /// Panics if iteration has already started.
    #[must_use]
    pub fn rev(mut self) -> Self {
        assert!(!self.initialized, "cannot reverse a started replay");
        self.reverse = true;
        self
    }

    fn init(&mut self) -> crate::Result<()> {
        self.tree.ready()?;
        self.end = self.tree.version();
        self.cursor = if self.reverse {
            self.end.saturating_sub(1)
        } else {
            self.since
        };
        Ok(())
    }

    fn advance(&mut self) -> crate::Result<Option<Change>> {
        if !self.initialized {
            self.initialized = true;
            self.init()?;
        }

        if self.cursor < self.since || self.cursor >= self.end {
            return Ok(None);
        }

        let seq = self.cursor;
        self.cursor = if self.reverse {
            // Running off the front parks the cursor below `since`
            self.cursor.wrapping_sub(1)
        } else {
            self.cursor + 1
        };

        let bytes = self.tree.feed().get(seq)?;
        let block = Block::decode_from(&mut &bytes[..])?;

        let key = self.tree.decode_key(&block.key)?;
        let change = match block.value {
            Some(value) => Change::Put(Entry {
                seq,
                key,
                value: self.tree.decode_value(&value)?,
            }),
            None => Change::Delete { seq, key },
        };

        Ok(Some(change))
    }
}

impl<F: Feed> Iterator for History<'_, F> {
    type Item = crate::Result<Change>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.advance() {
            Ok(Some(change)) => Some(Ok(change)),
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
