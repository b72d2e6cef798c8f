//! Progress reporting and cooperative cancellation.
//!
//! [`CancellationToken`] is the single abort signal a host threads through
//! from its request lifecycle. It is polled by FFmpeg's interrupt callback,
//! by the byte-source read/seek callbacks and by the selector between
//! frames. [`ProgressCallback`] observes how many frames a selection pass
//! has scanned.
//!
//! Cancellation is best-effort: native work already running is never
//! preempted, so the latency of an abort is bounded by how often FFmpeg
//! polls the interrupt callback or calls back into the source.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use thumbframe::{
//!     ByteSource, CancellationToken, MediaSession, ProgressCallback, ProgressInfo,
//!     SessionOptions, ThumbError,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{:?}] {} frames", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = SessionOptions::new()
//!     .with_cancellation(token.clone())
//!     .with_progress(Arc::new(PrintProgress));
//! let mut session = MediaSession::open_with_options(ByteSource::open_file("input.mp4")?, options)?;
//! session.select_best()?;
//! # Ok::<(), ThumbError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The kind of scan currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding candidate frames for a selection.
    FrameScan,
    /// Reading packet timestamps to recover a missing container duration.
    DurationProbe,
}

/// A snapshot of scan progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many frames (or packets) have been processed so far.
    pub current: u64,
    /// Upper bound on the work, if known ahead of time.
    pub total: Option<u64>,
    /// Wall-clock time elapsed since the scan started.
    pub elapsed: Duration,
    /// Timestamp of the most recent frame, if it carried one.
    pub current_timestamp: Option<Duration>,
}

/// Receives progress updates during a selection pass.
///
/// Callbacks are infallible: they observe but cannot halt the scan. Use
/// [`CancellationToken`] to stop it.
pub trait ProgressCallback: Send + Sync {
    /// Called every `batch_size` items and once when the scan ends.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share state; cancelling any clone cancels them all.
///
/// # Example
///
/// ```
/// use thumbframe::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.clone().cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks scan timing and emits throttled callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            since_last_report: 0,
        }
    }

    /// Record one item and report when the batch threshold is reached.
    pub(crate) fn advance(&mut self, timestamp: Option<Duration>) {
        self.current += 1;
        self.since_last_report += 1;
        if self.since_last_report >= self.batch_size {
            self.report(timestamp);
            self.since_last_report = 0;
        }
    }

    /// Unconditionally emit a final report.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    fn report(&self, timestamp: Option<Duration>) {
        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            elapsed: self.start_time.elapsed(),
            current_timestamp: timestamp,
        });
    }
}
