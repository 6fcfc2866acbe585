// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An append-only, copy-on-write B-tree index on top of an append-only log.
//!
//! ##### About
//!
//! This crate layers a sorted key/value store with range scans and
//! time-travel queries over any append-only block feed (see [`Feed`]).
//!
//! Every mutation appends exactly one immutable block. A block carries the
//! key and value of its mutation plus a compact re-indexing of only the tree
//! nodes the mutation touched; references to untouched subtrees keep pointing
//! at the blocks that last published them. History is therefore never
//! rewritten, and any previous state of the map remains addressable through
//! [`Tree::checkout`].
//!
//! Writes go through [`Batch`]es: single-shot operations append immediately,
//! while an explicit [`Tree::batch`] stages any number of mutations and makes
//! them visible in one atomic feed append.
//!
//! # Example usage
//!
//! ```
//! use bee_tree::{Config, MemoryFeed};
//!
//! let tree = Config::new(MemoryFeed::new()).open()?;
//!
//! tree.put("bee", "keeper")?;
//!
//! let entry = tree.get("bee")?.expect("was just inserted");
//! assert_eq!(b"keeper", &*entry.value);
//!
//! // Old versions stay addressable
//! let snapshot = tree.snapshot();
//! tree.put("bee", "hive")?;
//!
//! assert_eq!(b"hive", &*tree.get("bee")?.expect("current").value);
//! assert_eq!(b"keeper", &*snapshot.get("bee")?.expect("pinned").value);
//!
//! // Range scans run over a consistent snapshot
//! for item in tree.range("a"..="z") {
//!     let entry = item?;
//!     // ...
//! }
//! #
//! # Ok::<(), bee_tree::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

mod batch;
mod block;
mod codec;

/// Serialization primitives shared by the wire types.
pub mod coding;

mod entry;
mod error;
mod extension;
mod feed;
mod header;
mod history;
mod index;
mod node;
mod range;
mod slice;
mod tree;

pub use {
    batch::Batch,
    block::Block,
    codec::{Codec, Identity},
    entry::Entry,
    error::{Error, Result},
    extension::{CacheAnnounce, Extension, ExtensionMessage, GetRequest},
    feed::{Feed, FileFeed, MemoryFeed},
    header::{Header, PROTOCOL},
    history::{Change, History},
    index::{Level, YoloIndex},
    range::Range,
    slice::Slice,
    tree::{Config, Tree},
};
