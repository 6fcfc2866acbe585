// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    index::YoloIndex,
    node::TreeNode,
    Error, Slice,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    sync::OnceLock,
};
use varint_rs::{VarintReader, VarintWriter};

/// Wire form of a tree block.
///
/// Carries the encoded [`YoloIndex`] of the changed spine plus the key (and
/// value, unless the block is a tombstone) of the mutation that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// Encoded [`YoloIndex`].
    pub index: Slice,

    /// Key bytes of the mutation.
    pub key: Slice,

    /// Value bytes; `None` marks a deletion.
    pub value: Option<Slice>,
}

impl Encode for Block {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: Keys, values and spine indexes are bounded well below u32
        #[allow(clippy::cast_possible_truncation)]
        {
            writer.write_u32_varint(self.index.len() as u32)?;
            writer.write_all(&self.index)?;

            writer.write_u32_varint(self.key.len() as u32)?;
            writer.write_all(&self.key)?;

            match &self.value {
                Some(value) => {
                    writer.write_u8(1)?;
                    writer.write_u32_varint(value.len() as u32)?;
                    writer.write_all(value)?;
                }
                None => {
                    writer.write_u8(0)?;
                }
            }
        }

        Ok(())
    }
}

impl Decode for Block {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32_varint()? as usize;
        let index = Slice::from_reader(reader, len)?;

        let len = reader.read_u32_varint()? as usize;
        let key = Slice::from_reader(reader, len)?;

        let value = match reader.read_u8()? {
            0 => None,
            1 => {
                let len = reader.read_u32_varint()? as usize;
                Some(Slice::from_reader(reader, len)?)
            }
            tag => {
                return Err(DecodeError::InvalidTag {
                    field: "Block::value",
                    tag,
                })
            }
        };

        Ok(Self { index, key, value })
    }
}

/// A hydrated feed block.
///
/// The embedded index is inflated lazily on first node access and cached;
/// the entry itself is immutable and shared through the handle's block cache.
pub struct BlockEntry {
    seq: u64,
    key: Slice,
    value: Option<Slice>,
    index_bytes: Slice,
    index: OnceLock<YoloIndex>,
}

impl BlockEntry {
    pub(crate) fn new(seq: u64, block: Block) -> Self {
        Self {
            seq,
            key: block.key,
            value: block.value,
            index_bytes: block.index,
            index: OnceLock::new(),
        }
    }

    pub(crate) fn key(&self) -> &Slice {
        &self.key
    }

    pub(crate) fn value(&self) -> Option<&Slice> {
        self.value.as_ref()
    }

    fn index(&self) -> crate::Result<&YoloIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }

        let decoded = YoloIndex::decode_from(&mut &self.index_bytes[..])?;

        // Losing the race is fine, both sides decoded the same bytes
        let _ = self.index.set(decoded);

        Ok(self.index.get().expect("index was just initialized"))
    }

    /// Materializes a node view over the level at `offset`.
    pub(crate) fn tree_node(&self, offset: u64) -> crate::Result<TreeNode> {
        let index = self.index()?;

        // NOTE: Level lists are tiny
        #[allow(clippy::cast_possible_truncation)]
        let level = index
            .levels
            .get(offset as usize)
            .ok_or(Error::Corrupted("node offset out of range"))?;

        Ok(TreeNode::from_level(self.seq, offset, level))
    }
}
