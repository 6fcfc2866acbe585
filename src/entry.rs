// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Slice;

/// KV record returned by lookups and range scans.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    /// Position of the block that inserted this key.
    ///
    /// Re-inserting a key moves its entry to the new block, so this doubles
    /// as a per-key modification stamp.
    pub seq: u64,

    /// Key bytes (after the key codec).
    pub key: Slice,

    /// Value bytes (after the value codec).
    pub value: Slice,
}
