// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Represents errors that can occur in the tree
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// The header block names a protocol this crate does not speak
    UnsupportedProtocol(String),

    /// A block was not readable from the feed
    BlockNotFound(u64),

    /// Write attempted through a read-only handle or feed
    ReadOnly,

    /// Invalid checksum value (got, expected)
    ChecksumMismatch {
        /// Checksum of the bytes that were read
        got: u64,

        /// Checksum stored alongside the record
        expected: u64,
    },

    /// An index referenced data that does not uphold the tree's invariants
    Corrupted(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BeeTreeError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Tree result
pub type Result<T> = std::result::Result<T, Error>;
