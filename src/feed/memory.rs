// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::Feed;
use crate::{Error, Slice};
use std::sync::{Arc, RwLock};

/// In-memory append-only feed.
///
/// Clones share the same storage, so a clone can be kept around to inspect
/// raw blocks while a tree owns the original. Mainly useful for tests and
/// ephemeral trees.
#[derive(Clone)]
pub struct MemoryFeed {
    blocks: Arc<RwLock<Vec<Slice>>>,
    writable: bool,
}

impl MemoryFeed {
    /// Creates an empty, writable feed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(RwLock::new(Vec::new())),
            writable: true,
        }
    }

    /// Returns a read-only handle over the same storage.
    #[must_use]
    pub fn read_only(&self) -> Self {
        Self {
            blocks: self.blocks.clone(),
            writable: false,
        }
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Feed for MemoryFeed {
    fn len(&self) -> u64 {
        self.blocks.read().expect("lock is poisoned").len() as u64
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn get(&self, seq: u64) -> crate::Result<Slice> {
        // NOTE: In-memory feeds are bounded by usize anyway
        #[allow(clippy::cast_possible_truncation)]
        self.blocks
            .read()
            .expect("lock is poisoned")
            .get(seq as usize)
            .cloned()
            .ok_or(Error::BlockNotFound(seq))
    }

    fn append(&self, blocks: &[Slice]) -> crate::Result<u64> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }

        let mut guard = self.blocks.write().expect("lock is poisoned");
        guard.extend(blocks.iter().cloned());
        Ok(guard.len() as u64)
    }
}
