// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod file;
mod memory;

pub use {file::FileFeed, memory::MemoryFeed};

use crate::Slice;

/// Contract for the append-only block store backing a tree.
///
/// Blocks are raw byte payloads addressed by their 0-based position (`seq`);
/// once appended they never change. The feed has a single logical writer: the
/// tree serializes its appends through one handle, and implementations only
/// need to be safe under that contract.
pub trait Feed {
    /// Prepares the feed for use. Idempotent.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the feed cannot be opened.
    fn ready(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Number of blocks in the feed.
    fn len(&self) -> u64;

    /// Returns `true` if the feed holds no blocks.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this handle may append.
    fn writable(&self) -> bool;

    /// Reads the raw block at `seq`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the block does not exist or cannot be read.
    fn get(&self, seq: u64) -> crate::Result<Slice>;

    /// Appends the given blocks in order, returning the new feed length.
    ///
    /// The append is atomic: either every block becomes readable, or none.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the feed is not writable or the write fails.
    fn append(&self, blocks: &[Slice]) -> crate::Result<u64>;

    /// Best-effort, non-blocking refresh of the feed view.
    ///
    /// Returns `true` if new blocks became visible. Local feeds have nothing
    /// to refresh and report `false`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the refresh attempt itself fails.
    fn update(&self) -> crate::Result<bool> {
        Ok(false)
    }
}
