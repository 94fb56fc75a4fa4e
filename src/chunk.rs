use crate::constants::{
    CHUNK_LARGE, CHUNK_LARGE_ABOVE, CHUNK_MEDIUM, CHUNK_MEDIUM_ABOVE, CHUNK_SMALL,
};

/// A file strictly larger than `above` bytes reads in `chunk_size` pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTier {
    pub above: u64,
    pub chunk_size: u64,
}

/// Chunk-size tiers, checked in order; the first matching tier wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTiers {
    tiers: Vec<ChunkTier>,
    fallback: u64,
}

impl ChunkTiers {
    pub fn new(tiers: Vec<ChunkTier>, fallback: u64) -> Self {
        Self { tiers, fallback }
    }

    pub fn chunk_size_for(&self, total_len: u64) -> u64 {
        self.tiers
            .iter()
            .find(|tier| total_len > tier.above)
            .map(|tier| tier.chunk_size)
            .unwrap_or(self.fallback)
    }
}

impl Default for ChunkTiers {
    fn default() -> Self {
        Self::new(
            vec![
                ChunkTier {
                    above: CHUNK_LARGE_ABOVE,
                    chunk_size: CHUNK_LARGE,
                },
                ChunkTier {
                    above: CHUNK_MEDIUM_ABOVE,
                    chunk_size: CHUNK_MEDIUM,
                },
            ],
            CHUNK_SMALL,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadChunk {
    pub id: u64,
    pub start: u64,
    pub length: u64,
}

/// Splits `[start, end)` into consecutive pieces of at most `chunk_size` bytes.
#[derive(Debug, Clone)]
pub struct ChunkIter {
    next: u64,
    end: u64,
    chunk_size: u64,
    id: u64,
}

impl ChunkIter {
    pub fn new(start: u64, end: u64, chunk_size: u64) -> Self {
        Self {
            next: start,
            end,
            chunk_size,
            id: 0,
        }
    }
}

impl Iterator for ChunkIter {
    type Item = ReadChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.chunk_size == 0 || self.next >= self.end {
            return None;
        }
        let length = (self.end - self.next).min(self.chunk_size);
        let chunk = ReadChunk {
            id: self.id,
            start: self.next,
            length,
        };
        self.next = self.next.saturating_add(length);
        self.id += 1;
        Some(chunk)
    }
}
