//! # Analysis Module
//!
//! Drives one metadata engine over one source file at a time.
//!
//! This handles:
//! - The size cap and the advisory memory check
//! - Whole-buffer vs. chunked strategy selection
//! - Progress bands for setup, reading and completion
//! - Classification of read and engine failures

pub mod strategy;
pub mod worker;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{EngineError, MediaReport, MetadataEngine};
use crate::format;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::reader::{BufferReader, ChunkedReader};
use crate::source::{ByteSource, ReadError, alloc_buffer, read_exact_at};
use crate::util;

pub use strategy::{AnalyzerSettings, ReadStrategy, select_strategy};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("file size {size} exceeds limit {limit}")]
    SizeLimitExceeded { size: u64, limit: u64 },
    #[error("metadata engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("{0}")]
    Unknown(String),
}

impl AnalysisError {
    /// Text shown to the user for each failure kind.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::SizeLimitExceeded { limit, .. } => format!(
                "File is too large. Maximum size: {}",
                format::file_size(*limit)
            ),
            AnalysisError::EngineUnavailable(_) => {
                "The analysis engine is not available. Try again later.".to_string()
            }
            AnalysisError::OutOfMemory => {
                "Not enough memory to analyze a file this large. Try a smaller file.".to_string()
            }
            AnalysisError::AccessDenied(_) => {
                "Access to the file was denied. Check its permissions.".to_string()
            }
            AnalysisError::Unknown(message) => format!("Error analyzing file: {message}"),
        }
    }
}

impl From<ReadError> for AnalysisError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::AccessDenied(message) => AnalysisError::AccessDenied(message),
            ReadError::OutOfMemory { .. } => AnalysisError::OutOfMemory,
            ReadError::Io(message) if message.to_ascii_lowercase().contains("memory") => {
                AnalysisError::OutOfMemory
            }
            other => AnalysisError::Unknown(other.to_string()),
        }
    }
}

impl From<EngineError> for AnalysisError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Read(read) => read.into(),
            EngineError::Init(message) => AnalysisError::EngineUnavailable(message),
            other => AnalysisError::Unknown(other.to_string()),
        }
    }
}

/// Lifecycle of one analysis. `Idle` at construction and after `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Idle,
    Preparing,
    Reading,
    Finalizing,
    Done,
    Failed,
}

enum EngineSlot {
    Ready(Arc<dyn MetadataEngine>),
    Unavailable(String),
}

/// Returns the host's free-memory estimate, if it has one.
pub type MemoryProbe = fn() -> Option<u64>;

/// Owns the engine and the progress state. `analyze` takes `&mut self`, so
/// one analyzer never runs two analyses at once.
pub struct Analyzer {
    engine: EngineSlot,
    settings: AnalyzerSettings,
    progress: ProgressTracker,
    phase: AnalysisPhase,
    memory_probe: MemoryProbe,
}

impl Analyzer {
    /// Build the engine once. A factory failure is remembered and every
    /// later `analyze` fails fast with `EngineUnavailable`.
    pub fn init<F>(
        factory: F,
        settings: AnalyzerSettings,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self
    where
        F: FnOnce() -> Result<Box<dyn MetadataEngine>, EngineError>,
    {
        let engine = match factory() {
            Ok(engine) => {
                info!(engine = engine.name(), "metadata engine ready");
                EngineSlot::Ready(Arc::from(engine))
            }
            Err(err) => {
                warn!("metadata engine failed to initialize: {err}");
                EngineSlot::Unavailable(err.to_string())
            }
        };
        Self {
            engine,
            settings,
            progress: ProgressTracker::new(reporter),
            phase: AnalysisPhase::Idle,
            memory_probe: util::available_memory,
        }
    }

    pub fn with_memory_probe(mut self, probe: MemoryProbe) -> Self {
        self.memory_probe = probe;
        self
    }

    pub fn phase(&self) -> AnalysisPhase {
        self.phase
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn engine_name(&self) -> Option<&str> {
        match &self.engine {
            EngineSlot::Ready(engine) => Some(engine.name()),
            EngineSlot::Unavailable(_) => None,
        }
    }

    /// Return to `Idle` and forget the previous progress.
    pub fn reset(&mut self) {
        self.transition(AnalysisPhase::Idle);
        self.progress.reset();
    }

    /// Analyze one file. The source is dropped before this returns, whatever
    /// the outcome. Failures are never retried.
    pub fn analyze(&mut self, source: Box<dyn ByteSource>) -> Result<MediaReport, AnalysisError> {
        self.transition(AnalysisPhase::Preparing);
        self.progress.reset();

        let outcome = self.run(source.as_ref());
        drop(source);

        match &outcome {
            Ok(report) => {
                info!(tracks = report.tracks().len(), "analysis complete");
                self.transition(AnalysisPhase::Done);
            }
            Err(err) => {
                warn!("analysis failed: {err}");
                self.transition(AnalysisPhase::Failed);
            }
        }
        outcome
    }

    fn run(&mut self, source: &dyn ByteSource) -> Result<MediaReport, AnalysisError> {
        let engine = match &self.engine {
            EngineSlot::Ready(engine) => Arc::clone(engine),
            EngineSlot::Unavailable(reason) => {
                return Err(AnalysisError::EngineUnavailable(reason.clone()));
            }
        };

        let total = source.len();
        if total > self.settings.max_file_bytes {
            return Err(AnalysisError::SizeLimitExceeded {
                size: total,
                limit: self.settings.max_file_bytes,
            });
        }

        if let Some(available) = (self.memory_probe)() {
            if strategy::exceeds_memory_share(total, available, self.settings.memory_warn_ratio) {
                warn!(
                    "file of {} may be too large for available memory ({})",
                    format::file_size(total),
                    format::file_size(available)
                );
            }
        }

        let strategy = select_strategy(total, &self.settings);
        info!(total, ?strategy, engine = engine.name(), "starting analysis");
        self.transition(AnalysisPhase::Reading);

        let report = match strategy {
            ReadStrategy::WholeBuffer => {
                self.progress.update(50.0, "loading");
                let mut data = alloc_buffer(total)?;
                read_exact_at(source, 0, &mut data)?;
                self.progress.update(80.0, "analyzing");
                let chunk_size = self.settings.chunk_tiers.chunk_size_for(total);
                let reader = BufferReader::new(data, chunk_size);
                engine.analyze(&reader)?
            }
            ReadStrategy::Chunked { chunk_size } => {
                self.progress.update(10.0, "analyzing large file");
                let reader = ChunkedReader::new(source, chunk_size, &self.progress);
                let result = engine.analyze(&reader);
                debug!(
                    storage_reads = reader.storage_reads(),
                    chunk_size,
                    "chunked reads finished"
                );
                result?
            }
        };

        self.transition(AnalysisPhase::Finalizing);
        self.progress.update(100.0, "complete");
        if !self.settings.completion_delay.is_zero() {
            std::thread::sleep(self.settings.completion_delay);
        }
        Ok(report)
    }

    fn transition(&mut self, next: AnalysisPhase) {
        debug!(from = ?self.phase, to = ?next, "analysis phase");
        self.phase = next;
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("engine", &self.engine_name())
            .field("settings", &self.settings)
            .field("phase", &self.phase)
            .field("progress", &self.progress)
            .finish()
    }
}
