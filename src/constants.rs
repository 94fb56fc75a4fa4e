//! # Constants
//!
//! Size units and the default thresholds used when no config overrides them.

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Files above this size are rejected before any read.
pub const MAX_FILE_BYTES: u64 = 24 * GIB;

/// Files at or below this size are read into a single buffer.
pub const WHOLE_BUFFER_LIMIT: u64 = 100 * MIB;

/// Fraction of available memory above which a memory warning is logged.
pub const MEMORY_WARN_RATIO: f64 = 0.5;

/// Pause after the final progress update, in milliseconds.
pub const COMPLETION_DELAY_MS: u64 = 500;

/// Largest `moov` box the built-in probe will buffer.
pub const MOOV_READ_LIMIT: u64 = 64 * MIB;

pub const CHUNK_LARGE: u64 = MIB;
pub const CHUNK_MEDIUM: u64 = 512 * KIB;
pub const CHUNK_SMALL: u64 = 64 * KIB;

pub const CHUNK_LARGE_ABOVE: u64 = GIB;
pub const CHUNK_MEDIUM_ABOVE: u64 = 500 * MIB;

/// Progress band reserved for the streaming read phase.
pub const READ_BAND_START: f64 = 10.0;
pub const READ_BAND_END: f64 = 80.0;

/// Capacity of the progress channel between analysis and front end.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;
