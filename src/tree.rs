// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    batch::Batch,
    block::BlockEntry,
    codec::Codec,
    coding::{Decode, Encode},
    entry::Entry,
    extension::Extension,
    feed::Feed,
    header::{Header, PROTOCOL},
    history::History,
    range::Range,
    Error, Slice,
};
use quick_cache::sync::Cache;
use std::{
    ops::{Bound, RangeBounds},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Default capacity (in blocks) of the per-handle block cache.
const DEFAULT_CACHE_CAPACITY: usize = 1_024;

/// Builder for a [`Tree`].
pub struct Config<F: Feed> {
    feed: F,
    cache_capacity: usize,
    metadata: Option<Slice>,
    key_codec: Option<Arc<dyn Codec>>,
    value_codec: Option<Arc<dyn Codec>>,
    extension: Option<Arc<dyn Extension>>,
}

impl<F: Feed> Config<F> {
    /// Starts a config over the given feed.
    pub fn new(feed: F) -> Self {
        Self {
            feed,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            metadata: None,
            key_codec: None,
            value_codec: None,
            extension: None,
        }
    }

    /// Sets the capacity of the block cache shared by all handles cloned
    /// from this tree.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Attaches opaque metadata to the header block written on first open.
    ///
    /// Has no effect on feeds that already carry a header.
    #[must_use]
    pub fn metadata(mut self, metadata: Slice) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Applies `codec` to user keys.
    ///
    /// Keys are compared on their encoded bytes, so the codec determines
    /// sort order.
    #[must_use]
    pub fn key_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.key_codec = Some(codec);
        self
    }

    /// Applies `codec` to user values.
    #[must_use]
    pub fn value_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.value_codec = Some(codec);
        self
    }

    /// Registers an extension that may opportunistically warm block fetches.
    #[must_use]
    pub fn extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extension = Some(extension);
        self
    }

    /// Opens the tree, writing the header block if the feed is empty and
    /// writable.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the feed cannot be opened or carries a foreign
    /// header.
    pub fn open(self) -> crate::Result<Tree<F>> {
        let tree = Tree {
            feed: Arc::new(self.feed),
            cache: Arc::new(Cache::new(self.cache_capacity)),
            metadata: self.metadata,
            key_codec: self.key_codec,
            value_codec: self.value_codec,
            extension: self.extension,
            checkout: None,
            header_verified: Arc::new(AtomicBool::new(false)),
        };
        tree.ready()?;
        Ok(tree)
    }
}

/// Handle to an append-only, copy-on-write B-tree over a feed.
///
/// Every mutation appends one immutable block; old blocks keep publishing the
/// versions they were part of, which is what makes [`Tree::checkout`] cheap.
///
/// Clones (including checkouts and snapshots) share the feed, block cache,
/// codecs and extension.
///
/// The feed has a single writer: callers must not interleave concurrent
/// mutations through one handle (or clones of it), or both would build
/// against the same root snapshot.
pub struct Tree<F: Feed> {
    feed: Arc<F>,
    cache: Arc<Cache<u64, Arc<BlockEntry>>>,
    metadata: Option<Slice>,
    key_codec: Option<Arc<dyn Codec>>,
    value_codec: Option<Arc<dyn Codec>>,
    extension: Option<Arc<dyn Extension>>,
    checkout: Option<u64>,
    header_verified: Arc<AtomicBool>,
}

impl<F: Feed> Clone for Tree<F> {
    fn clone(&self) -> Self {
        Self {
            feed: self.feed.clone(),
            cache: self.cache.clone(),
            metadata: self.metadata.clone(),
            key_codec: self.key_codec.clone(),
            value_codec: self.value_codec.clone(),
            extension: self.extension.clone(),
            checkout: self.checkout,
            header_verified: self.header_verified.clone(),
        }
    }
}

impl<F: Feed> Tree<F> {
    /// Opens a tree over `feed` with default options.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the feed cannot be opened or carries a foreign
    /// header.
    pub fn open(feed: F) -> crate::Result<Self> {
        Config::new(feed).open()
    }

    /// Prepares the handle: verifies the header block, writing it first if
    /// the feed is empty and writable. Idempotent.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the feed fails or block 0 is not a header this
    /// crate understands.
    pub fn ready(&self) -> crate::Result<()> {
        if self.header_verified.load(Ordering::Relaxed) {
            return Ok(());
        }

        self.feed.ready()?;

        if self.feed.is_empty() {
            if !self.feed.writable() {
                // Nothing to verify yet; stays unverified until blocks arrive
                return Ok(());
            }

            let header = Header::new(self.metadata.clone());
            self.feed.append(&[header.encode_into_vec().into()])?;
            log::debug!("wrote header block");
        } else {
            let bytes = self.feed.get(0)?;
            let header = Header::decode_from(&mut &bytes[..])?;
            if header.protocol != PROTOCOL {
                return Err(Error::UnsupportedProtocol(header.protocol));
            }
        }

        self.header_verified.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Current version: the pinned checkout, or the feed length (always at
    /// least 1, counting the header).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.checkout.unwrap_or_else(|| self.feed.len().max(1))
    }

    /// Best-effort, non-blocking refresh of the feed view.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the refresh attempt itself fails.
    pub fn update(&self) -> crate::Result<bool> {
        self.feed.update()
    }

    /// Returns a handle pinned at `version`: an immutable view of the tree
    /// as of that version.
    #[must_use]
    pub fn checkout(&self, version: u64) -> Self {
        let mut this = self.clone();
        this.checkout = Some(version.max(1));
        this
    }

    /// Returns a handle pinned at the current version.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.checkout(self.version())
    }

    /// Point lookup at the handle's version.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a block fetch or decode fails.
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<Option<Entry>> {
        Batch::new(self, true).get(key)
    }

    /// Inserts `key` → `value`, appending one block.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the handle is read-only or the feed fails; on
    /// error nothing has been appended.
    pub fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, key: K, value: V) -> crate::Result<()> {
        Batch::new(self, true).put(key, value)
    }

    /// Deletes `key`, appending one tombstone block. Deleting a key that
    /// does not exist appends nothing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the handle is read-only or the feed fails; on
    /// error nothing has been appended.
    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<()> {
        Batch::new(self, true).delete(key)
    }

    /// Opens a batch whose mutations become visible atomically on
    /// [`Batch::flush`].
    #[must_use]
    pub fn batch(&self) -> Batch<'_, F> {
        Batch::new(self, false)
    }

    /// Iterates the whole tree in key order.
    #[must_use]
    pub fn iter(&self) -> Range<'_, F> {
        self.range::<&[u8], _>(..)
    }

    /// Iterates `range` in key order.
    ///
    /// All four bound flavors are expressible through standard range syntax
    /// or explicit [`Bound`] pairs; combine with [`Iterator::take`] for a
    /// limit, or [`Range::rev`] to scan backwards.
    pub fn range<K: AsRef<[u8]>, R: RangeBounds<K>>(&self, range: R) -> Range<'_, F> {
        let start = self.encode_bound(range.start_bound());
        let end = self.encode_bound(range.end_bound());
        Range::new(self, start, end)
    }

    /// Replays tree blocks oldest-first.
    #[must_use]
    pub fn history(&self) -> History<'_, F> {
        History::new(self)
    }

    fn encode_bound<K: AsRef<[u8]>>(&self, bound: Bound<&K>) -> Bound<Slice> {
        match bound {
            Bound::Included(key) => Bound::Included(self.encode_key(key.as_ref())),
            Bound::Excluded(key) => Bound::Excluded(self.encode_key(key.as_ref())),
            Bound::Unbounded => Bound::Unbounded,
        }
    }

    pub(crate) fn encode_key(&self, key: &[u8]) -> Slice {
        match &self.key_codec {
            Some(codec) => codec.encode(key),
            None => key.into(),
        }
    }

    pub(crate) fn decode_key(&self, bytes: &[u8]) -> crate::Result<Slice> {
        match &self.key_codec {
            Some(codec) => codec.decode(bytes),
            None => Ok(bytes.into()),
        }
    }

    pub(crate) fn encode_value(&self, value: &[u8]) -> Slice {
        match &self.value_codec {
            Some(codec) => codec.encode(value),
            None => value.into(),
        }
    }

    pub(crate) fn decode_value(&self, bytes: &[u8]) -> crate::Result<Slice> {
        match &self.value_codec {
            Some(codec) => codec.decode(bytes),
            None => Ok(bytes.into()),
        }
    }

    pub(crate) fn feed(&self) -> &F {
        &self.feed
    }

    pub(crate) fn pinned(&self) -> Option<u64> {
        self.checkout
    }

    pub(crate) fn extension(&self) -> Option<&Arc<dyn Extension>> {
        self.extension.as_ref()
    }

    pub(crate) fn cached_block(&self, seq: u64) -> Option<Arc<BlockEntry>> {
        self.cache.get(&seq)
    }

    pub(crate) fn cache_block(&self, seq: u64, entry: Arc<BlockEntry>) {
        self.cache.insert(seq, entry);
    }
}
