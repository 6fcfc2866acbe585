// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Slice;

/// Byte transform applied to user keys or values at the public boundary.
///
/// The tree compares keys on their *encoded* bytes, so a key codec determines
/// sort order. Internal index blobs are never passed through a codec.
pub trait Codec: Send + Sync {
    /// Encodes a user-supplied buffer into its stored representation.
    fn encode(&self, item: &[u8]) -> Slice;

    /// Decodes a stored buffer back into the user representation.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the stored bytes are not valid for this codec.
    fn decode(&self, bytes: &[u8]) -> crate::Result<Slice>;
}

/// Stores bytes exactly as given.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl Codec for Identity {
    fn encode(&self, item: &[u8]) -> Slice {
        item.into()
    }

    fn decode(&self, bytes: &[u8]) -> crate::Result<Slice> {
        Ok(bytes.into())
    }
}
