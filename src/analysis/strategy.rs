//! # Read Strategy
//!
//! Picks whole-buffer or chunked reading once per analysis.

use std::time::Duration;

use crate::chunk::ChunkTiers;
use crate::config::Config;
use crate::constants::{COMPLETION_DELAY_MS, MAX_FILE_BYTES, MEMORY_WARN_RATIO, WHOLE_BUFFER_LIMIT};

/// Thresholds the analyzer works with. `Default` carries the documented
/// constants; `from_config` takes them from a loaded config.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub max_file_bytes: u64,
    pub whole_buffer_limit: u64,
    pub memory_warn_ratio: f64,
    pub completion_delay: Duration,
    pub chunk_tiers: ChunkTiers,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: MAX_FILE_BYTES,
            whole_buffer_limit: WHOLE_BUFFER_LIMIT,
            memory_warn_ratio: MEMORY_WARN_RATIO,
            completion_delay: Duration::from_millis(COMPLETION_DELAY_MS),
            chunk_tiers: ChunkTiers::default(),
        }
    }
}

impl AnalyzerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_file_bytes: cfg.max_file_bytes,
            whole_buffer_limit: cfg.whole_buffer_limit,
            memory_warn_ratio: cfg.memory_warn_ratio,
            completion_delay: Duration::from_millis(cfg.completion_delay_ms),
            chunk_tiers: cfg.chunk_tiers(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Read the whole file into one buffer, then serve the engine from memory.
    WholeBuffer,
    /// Serve each engine request from storage in bounded pieces.
    Chunked { chunk_size: u64 },
}

pub fn select_strategy(total_len: u64, settings: &AnalyzerSettings) -> ReadStrategy {
    if total_len <= settings.whole_buffer_limit {
        ReadStrategy::WholeBuffer
    } else {
        ReadStrategy::Chunked {
            chunk_size: settings.chunk_tiers.chunk_size_for(total_len),
        }
    }
}

/// True when the file is larger than the configured share of available
/// memory. Advisory only.
pub fn exceeds_memory_share(total_len: u64, available: u64, ratio: f64) -> bool {
    total_len as f64 > available as f64 * ratio
}
