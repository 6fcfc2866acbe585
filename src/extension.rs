// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    Slice,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

/// Hook for opportunistically warming remote block fetches.
///
/// A lookup invokes [`Extension::get`] at most once, the first time it has to
/// fault a block in from the feed; an implementation may use this to ask
/// peers for the blocks the lookup is about to traverse.
pub trait Extension: Send + Sync {
    /// Announces that a lookup rooted at the block `head` is descending
    /// towards `key`.
    fn get(&self, head: u64, key: &[u8]);
}

/// Peer gossip payload: announce locally cached blocks and request remote
/// lookups.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtensionMessage {
    /// Cached-block announcement.
    pub cache: Option<CacheAnnounce>,

    /// Remote lookup request.
    pub get: Option<GetRequest>,
}

/// A contiguous run plus a sparse set of locally available blocks.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheAnnounce {
    /// First seq of the contiguous run.
    pub start: u64,

    /// One past the last seq of the contiguous run.
    pub end: u64,

    /// Additional seqs outside the run.
    pub blocks: Vec<u64>,
}

/// Ask a peer to resolve `key` against the tree rooted at `head`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GetRequest {
    /// Root block of the version to resolve against.
    pub head: Option<u64>,

    /// Encoded key bytes to look up.
    pub key: Option<Slice>,
}

impl Encode for ExtensionMessage {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match &self.cache {
            Some(cache) => {
                writer.write_u8(1)?;
                writer.write_u64_varint(cache.start)?;
                writer.write_u64_varint(cache.end)?;
                writer.write_u64_varint(cache.blocks.len() as u64)?;
                for seq in &cache.blocks {
                    writer.write_u64_varint(*seq)?;
                }
            }
            None => writer.write_u8(0)?,
        }

        match &self.get {
            Some(get) => {
                writer.write_u8(1)?;

                match get.head {
                    Some(head) => {
                        writer.write_u8(1)?;
                        writer.write_u64_varint(head)?;
                    }
                    None => writer.write_u8(0)?,
                }

                match &get.key {
                    Some(key) => {
                        writer.write_u8(1)?;

                        // NOTE: Keys are bounded well below u32
                        #[allow(clippy::cast_possible_truncation)]
                        writer.write_u32_varint(key.len() as u32)?;
                        writer.write_all(key)?;
                    }
                    None => writer.write_u8(0)?,
                }
            }
            None => writer.write_u8(0)?,
        }

        Ok(())
    }
}

impl Decode for ExtensionMessage {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let cache = match reader.read_u8()? {
            0 => None,
            1 => {
                let start = reader.read_u64_varint()?;
                let end = reader.read_u64_varint()?;
                let count = reader.read_u64_varint()?;
                let mut blocks = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    blocks.push(reader.read_u64_varint()?);
                }
                Some(CacheAnnounce { start, end, blocks })
            }
            tag => {
                return Err(DecodeError::InvalidTag {
                    field: "ExtensionMessage::cache",
                    tag,
                })
            }
        };

        let get = match reader.read_u8()? {
            0 => None,
            1 => {
                let head = match reader.read_u8()? {
                    0 => None,
                    1 => Some(reader.read_u64_varint()?),
                    tag => {
                        return Err(DecodeError::InvalidTag {
                            field: "GetRequest::head",
                            tag,
                        })
                    }
                };

                let key = match reader.read_u8()? {
                    0 => None,
                    1 => {
                        let len = reader.read_u32_varint()? as usize;
                        Some(Slice::from_reader(reader, len)?)
                    }
                    tag => {
                        return Err(DecodeError::InvalidTag {
                            field: "GetRequest::key",
                            tag,
                        })
                    }
                };

                Some(GetRequest { head, key })
            }
            tag => {
                return Err(DecodeError::InvalidTag {
                    field: "ExtensionMessage::get",
                    tag,
                })
            }
        };

        Ok(Self { cache, get })
    }
}
