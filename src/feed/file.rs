// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::Feed;
use crate::{Error, Slice};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};
use xxhash_rust::xxh3::xxh3_64;

// Each record is [u32 payload length][u64 xxh3 of payload][payload]
const RECORD_HEADER_SIZE: u64 = 4 + 8;

struct Inner {
    file: File,

    /// Byte offset of every record, in seq order.
    offsets: Vec<u64>,

    /// End of the last complete record; appends resume here, so a torn tail
    /// record is overwritten instead of accumulating.
    tail: u64,
}

/// Append-only feed stored as a single file of checksummed records.
///
/// The offset index is rebuilt by scanning the file on open; a trailing
/// record cut short by a crash is ignored.
pub struct FileFeed {
    inner: Mutex<Inner>,
}

impl FileFeed {
    /// Opens (or creates) the feed file at `path`, re-indexing existing
    /// records.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let mut offsets = Vec::new();
        let mut pos = 0;

        while pos + RECORD_HEADER_SIZE <= file_len {
            file.seek(SeekFrom::Start(pos))?;
            let payload_len = u64::from(file.read_u32::<LittleEndian>()?);

            if pos + RECORD_HEADER_SIZE + payload_len > file_len {
                break;
            }

            offsets.push(pos);
            pos += RECORD_HEADER_SIZE + payload_len;
        }

        log::debug!("opened feed file with {} blocks", offsets.len());

        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                offsets,
                tail: pos,
            }),
        })
    }
}

impl Feed for FileFeed {
    fn len(&self) -> u64 {
        self.inner.lock().expect("lock is poisoned").offsets.len() as u64
    }

    fn writable(&self) -> bool {
        true
    }

    fn get(&self, seq: u64) -> crate::Result<Slice> {
        let mut inner = self.inner.lock().expect("lock is poisoned");

        // NOTE: Record counts are bounded by the file size
        #[allow(clippy::cast_possible_truncation)]
        let offset = *inner
            .offsets
            .get(seq as usize)
            .ok_or(Error::BlockNotFound(seq))?;

        inner.file.seek(SeekFrom::Start(offset))?;
        let payload_len = inner.file.read_u32::<LittleEndian>()? as usize;
        let expected = inner.file.read_u64::<LittleEndian>()?;
        let payload = Slice::from_reader(&mut inner.file, payload_len)?;

        let got = xxh3_64(&payload);
        if got != expected {
            return Err(Error::ChecksumMismatch { got, expected });
        }

        Ok(payload)
    }

    fn append(&self, blocks: &[Slice]) -> crate::Result<u64> {
        let mut inner = self.inner.lock().expect("lock is poisoned");
        let Inner {
            file,
            offsets,
            tail,
        } = &mut *inner;

        file.seek(SeekFrom::Start(*tail))?;

        for block in blocks {
            // NOTE: Blocks hold a single key, value and spine index; u32 is plenty
            #[allow(clippy::cast_possible_truncation)]
            file.write_u32::<LittleEndian>(block.len() as u32)?;
            file.write_u64::<LittleEndian>(xxh3_64(block))?;
            file.write_all(block)?;

            offsets.push(*tail);
            *tail += RECORD_HEADER_SIZE + block.len() as u64;
        }

        // Drop any stale bytes of a previously torn record past the new tail
        file.set_len(*tail)?;
        file.sync_all()?;

        Ok(offsets.len() as u64)
    }
}
