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

/// Protocol string stored in the header block at seq 0.
pub const PROTOCOL: &str = "hyperbee";

/// The first block of every feed (seq 0).
///
/// Names the protocol the remaining blocks speak and optionally carries
/// opaque application metadata (e.g. the key of a linked content feed).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// Protocol identifier; always [`PROTOCOL`] for blocks written by this
    /// crate.
    pub protocol: String,

    /// Opaque application metadata.
    pub metadata: Option<Slice>,
}

impl Header {
    pub(crate) fn new(metadata: Option<Slice>) -> Self {
        Self {
            protocol: PROTOCOL.into(),
            metadata,
        }
    }
}

impl Encode for Header {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: Protocol strings are tiny
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32_varint(self.protocol.len() as u32)?;
        writer.write_all(self.protocol.as_bytes())?;

        match &self.metadata {
            Some(metadata) => {
                writer.write_u8(1)?;

                // NOTE: Metadata is a single small blob
                #[allow(clippy::cast_possible_truncation)]
                writer.write_u32_varint(metadata.len() as u32)?;
                writer.write_all(metadata)?;
            }
            None => {
                writer.write_u8(0)?;
            }
        }

        Ok(())
    }
}

impl Decode for Header {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32_varint()? as usize;
        let protocol = Slice::from_reader(reader, len)?;
        let protocol = std::str::from_utf8(&protocol)?.to_owned();

        let metadata = match reader.read_u8()? {
            0 => None,
            1 => {
                let len = reader.read_u32_varint()? as usize;
                Some(Slice::from_reader(reader, len)?)
            }
            tag => {
                return Err(DecodeError::InvalidTag {
                    field: "Header::metadata",
                    tag,
                })
            }
        };

        Ok(Self { protocol, metadata })
    }
}
