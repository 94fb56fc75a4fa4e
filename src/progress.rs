//! # Progress
//!
//! Progress reporting for a single analysis. The analyzer and the reader it
//! builds are the only writers; front ends observe updates through a
//! [`ProgressReporter`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;

/// Progress snapshot handed to reporters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Completion percentage (0.0 - 100.0)
    pub percent: f64,
    pub message: String,
}

/// Progress callback trait for running analyses.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);
}

pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

/// Forwards updates to another thread. A disconnected receiver is ignored.
pub struct ChannelReporter {
    tx: Sender<ProgressUpdate>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<ProgressUpdate>) -> Self {
        Self { tx }
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_progress(&self, update: &ProgressUpdate) {
        let _ = self.tx.send(update.clone());
    }
}

/// Keeps the reported percentage inside `[0, 100]` and never lets it go
/// backwards within one analysis.
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    high_water: AtomicU64,
}

impl ProgressTracker {
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            high_water: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Forget the previous analysis and report `(0, "preparing")`.
    pub fn reset(&self) {
        self.high_water.store(0f64.to_bits(), Ordering::Release);
        self.reporter.on_progress(&ProgressUpdate {
            percent: 0.0,
            message: "preparing".to_string(),
        });
    }

    /// Report `percent`, raised to the current high-water mark if the caller
    /// asks for less. Non-finite values are dropped.
    pub fn update(&self, percent: f64, message: impl Into<String>) {
        if !percent.is_finite() {
            return;
        }
        let requested = percent.clamp(0.0, 100.0);
        let previous = self
            .high_water
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let current = f64::from_bits(bits);
                (requested > current).then_some(requested.to_bits())
            })
            .unwrap_or_else(|bits| bits);
        let effective = requested.max(f64::from_bits(previous));
        self.reporter.on_progress(&ProgressUpdate {
            percent: effective,
            message: message.into(),
        });
    }

    pub fn current(&self) -> f64 {
        f64::from_bits(self.high_water.load(Ordering::Acquire))
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current", &self.current())
            .finish()
    }
}
