// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

/// Compact serialization of the changed spine of the tree as of one block.
///
/// Each level is one re-indexed node; a node's position in `levels` is its
/// *offset*, and level 0 is the root of the snapshot the block publishes.
/// References to nodes that did not change at this block point backwards
/// into earlier blocks.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct YoloIndex {
    /// One level per re-indexed node.
    pub levels: Vec<Level>,
}

/// A single re-indexed node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Level {
    /// For each key, the seq of the block whose own `key` field holds the
    /// key bytes.
    pub keys: Vec<u64>,

    /// Flattened `(seq, offset)` child references; always of even length.
    /// Empty for leaves.
    pub children: Vec<u64>,
}

impl Level {
    /// Iterates the `(seq, offset)` child pairs.
    pub fn child_pairs(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.children.chunks_exact(2).map(|pair| {
            let &[seq, offset] = pair else {
                unreachable!("chunks are exactly 2 wide");
            };
            (seq, offset)
        })
    }
}

impl Encode for YoloIndex {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64_varint(self.levels.len() as u64)?;

        for level in &self.levels {
            writer.write_u64_varint(level.keys.len() as u64)?;
            for seq in &level.keys {
                writer.write_u64_varint(*seq)?;
            }

            writer.write_u64_varint(level.children.len() as u64)?;
            for word in &level.children {
                writer.write_u64_varint(*word)?;
            }
        }

        Ok(())
    }
}

impl Decode for YoloIndex {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let level_count = reader.read_u64_varint()?;
        let mut levels = Vec::with_capacity(level_count as usize);

        for _ in 0..level_count {
            let key_count = reader.read_u64_varint()?;
            let mut keys = Vec::with_capacity(key_count as usize);
            for _ in 0..key_count {
                keys.push(reader.read_u64_varint()?);
            }

            let child_count = reader.read_u64_varint()?;
            if child_count % 2 != 0 {
                return Err(DecodeError::Malformed("children length must be even"));
            }
            let mut children = Vec::with_capacity(child_count as usize);
            for _ in 0..child_count {
                children.push(reader.read_u64_varint()?);
            }

            levels.push(Level { keys, children });
        }

        Ok(Self { levels })
    }
}
