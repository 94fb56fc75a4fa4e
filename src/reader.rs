//! # Pull Readers
//!
//! The two answers to the engine's `size` / `read_at` contract: a buffer
//! holding the whole file, and a chunked reader that goes to storage on
//! every call.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::chunk::ChunkIter;
use crate::constants::{READ_BAND_END, READ_BAND_START};
use crate::format;
use crate::progress::ProgressTracker;
use crate::source::{ByteSource, ReadError, alloc_buffer, read_exact_at};

/// Pull interface handed to a [`MetadataEngine`](crate::engine::MetadataEngine).
///
/// `read_at` returns `min(length, size() - offset)` bytes, and an empty
/// buffer once `offset` reaches the end. Every call is answered on its own;
/// readers keep no cursor.
pub trait ByteReader {
    fn size(&self) -> u64;
    fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>, ReadError>;
    /// Preferred request length for engines that scan sequentially.
    fn chunk_size(&self) -> u64;
}

fn clamp_range(total: u64, offset: u64, length: u64) -> u64 {
    if offset >= total {
        0
    } else {
        length.min(total - offset)
    }
}

/// Whole-buffer path: the file is already in memory.
#[derive(Debug)]
pub struct BufferReader {
    data: Vec<u8>,
    chunk_size: u64,
}

impl BufferReader {
    pub fn new(data: Vec<u8>, chunk_size: u64) -> Self {
        Self { data, chunk_size }
    }
}

impl ByteReader for BufferReader {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>, ReadError> {
        let len = clamp_range(self.size(), offset, length);
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = offset as usize;
        Ok(self.data[start..start + len as usize].to_vec())
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

/// Presents a large file as bounded reads against storage.
///
/// Each storage read covers at most `chunk_size` bytes. Progress inside the
/// `[10, 80]` band is reported on every call, proportional to the offset.
pub struct ChunkedReader<'a> {
    source: &'a dyn ByteSource,
    total: u64,
    chunk_size: u64,
    progress: &'a ProgressTracker,
    storage_reads: AtomicU64,
}

impl<'a> ChunkedReader<'a> {
    pub fn new(source: &'a dyn ByteSource, chunk_size: u64, progress: &'a ProgressTracker) -> Self {
        Self {
            total: source.len(),
            source,
            chunk_size: chunk_size.max(1),
            progress,
            storage_reads: AtomicU64::new(0),
        }
    }

    /// Number of storage reads issued so far.
    pub fn storage_reads(&self) -> u64 {
        self.storage_reads.load(Ordering::Relaxed)
    }

    fn read_percent(&self, offset: u64) -> f64 {
        if self.total == 0 {
            return READ_BAND_END;
        }
        let span = READ_BAND_END - READ_BAND_START;
        (READ_BAND_START + (offset as f64 / self.total as f64) * span).min(READ_BAND_END)
    }
}

impl std::fmt::Debug for ChunkedReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedReader")
            .field("total", &self.total)
            .field("chunk_size", &self.chunk_size)
            .field("storage_reads", &self.storage_reads())
            .finish()
    }
}

impl ByteReader for ChunkedReader<'_> {
    fn size(&self) -> u64 {
        self.total
    }

    fn read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>, ReadError> {
        self.progress.update(
            self.read_percent(offset),
            format!(
                "reading {} of {}",
                format::file_size(offset.min(self.total)),
                format::file_size(self.total)
            ),
        );

        let len = clamp_range(self.total, offset, length);
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut buf = alloc_buffer(len)?;
        for chunk in ChunkIter::new(offset, offset + len, self.chunk_size) {
            let start = (chunk.start - offset) as usize;
            let end = start + chunk.length as usize;
            self.storage_reads.fetch_add(1, Ordering::Relaxed);
            read_exact_at(self.source, chunk.start, &mut buf[start..end])?;
        }
        debug!(offset, len, chunk_size = self.chunk_size, "chunked read");
        Ok(buf)
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}
