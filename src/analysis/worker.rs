//! # Analysis Worker
//!
//! Runs an analysis off the front-end thread and streams progress back over
//! a bounded channel.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, bounded};

use crate::analysis::{AnalysisError, Analyzer, AnalyzerSettings};
use crate::constants::PROGRESS_CHANNEL_CAPACITY;
use crate::engine::{EngineError, MediaReport, MetadataEngine};
use crate::progress::{ChannelReporter, ProgressUpdate};
use crate::source::ByteSource;

pub struct AnalysisJob {
    pub progress: Receiver<ProgressUpdate>,
    handle: thread::JoinHandle<Result<MediaReport, AnalysisError>>,
}

impl AnalysisJob {
    /// Wait for the worker and return its result.
    ///
    /// The progress receiver is dropped first, so updates not yet drained
    /// are discarded and the worker never blocks on a full channel.
    pub fn join(self) -> Result<MediaReport, AnalysisError> {
        let AnalysisJob { progress, handle } = self;
        drop(progress);
        handle.join().unwrap_or_else(|_| {
            Err(AnalysisError::Unknown(
                "analysis thread panicked".to_string(),
            ))
        })
    }
}

/// Build an analyzer wired to a progress channel and run `source` through it
/// on a dedicated thread.
pub fn spawn_analysis<F>(
    factory: F,
    settings: AnalyzerSettings,
    source: Box<dyn ByteSource>,
) -> AnalysisJob
where
    F: FnOnce() -> Result<Box<dyn MetadataEngine>, EngineError>,
{
    let (tx, rx) = bounded::<ProgressUpdate>(PROGRESS_CHANNEL_CAPACITY);
    let mut analyzer = Analyzer::init(factory, settings, Arc::new(ChannelReporter::new(tx)));
    let handle = thread::spawn(move || analyzer.analyze(source));
    AnalysisJob {
        progress: rx,
        handle,
    }
}
