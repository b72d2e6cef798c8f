//! Session configuration.
//!
//! [`SessionOptions`] is a builder that threads the cancellation token,
//! progress callback and selection tuning through a
//! [`MediaSession`](crate::MediaSession) without widening every method
//! signature. A default-constructed value reproduces the stock behaviour.
//!
//! # Example
//!
//! ```no_run
//! use thumbframe::{CancellationToken, ScoringStrategy, SessionOptions};
//!
//! let token = CancellationToken::new();
//! let options = SessionOptions::new()
//!     .with_cancellation(token.clone())
//!     .with_max_frames(50)
//!     .with_scoring(ScoringStrategy::Representative);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::signature::{DetailScorer, FrameScorer, RepresentativeScorer};

/// Default ceiling on `bits_per_pixel * width * height` for one frame.
pub const DEFAULT_PIXEL_BUDGET: u64 = 1 << 30;

/// Default size of the buffer FFmpeg reads into through the byte source.
pub const DEFAULT_IO_BUFFER_SIZE: usize = 4096;

const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// How best-frame mode ranks its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringStrategy {
    /// Prefer the frame with the most tonal detail (highest histogram
    /// entropy). Streams candidates and keeps only the current best.
    #[default]
    Detail,
    /// Prefer the frame whose histogram is closest to the mean of all
    /// candidates. Keeps every candidate until the pass ends.
    Representative,
}

impl ScoringStrategy {
    pub(crate) fn scorer(self) -> Box<dyn FrameScorer> {
        match self {
            ScoringStrategy::Detail => Box::new(DetailScorer::new()),
            ScoringStrategy::Representative => Box::new(RepresentativeScorer::new()),
        }
    }
}

/// Options for opening and driving a [`MediaSession`](crate::MediaSession).
#[derive(Clone)]
pub struct SessionOptions {
    pub(crate) cancellation: CancellationToken,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
    pub(crate) max_frames: Option<u64>,
    pub(crate) scoring: ScoringStrategy,
    pub(crate) pixel_budget: u64,
    pub(crate) channel_capacity: usize,
    pub(crate) io_buffer_size: usize,
    pub(crate) prefer_libvpx: bool,
}

impl Debug for SessionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SessionOptions")
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("batch_size", &self.batch_size)
            .field("max_frames", &self.max_frames)
            .field("scoring", &self.scoring)
            .field("pixel_budget", &self.pixel_budget)
            .field("channel_capacity", &self.channel_capacity)
            .field("io_buffer_size", &self.io_buffer_size)
            .field("prefer_libvpx", &self.prefer_libvpx)
            .finish_non_exhaustive()
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionOptions {
    /// Create options with default settings.
    ///
    /// Defaults: a fresh (never-fired) cancellation token, no progress
    /// callback, batch size 1, no frame cap, detail scoring, a 2^30-bit
    /// pixel budget, 4 KiB I/O buffer, libvpx preferred for VP8/VP9.
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
            max_frames: None,
            scoring: ScoringStrategy::default(),
            pixel_budget: DEFAULT_PIXEL_BUDGET,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            prefer_libvpx: true,
        }
    }

    /// Attach a cancellation token.
    ///
    /// Firing it makes the in-flight native call and every later operation
    /// on the session fail with [`ThumbError::Unknown`](crate::ThumbError::Unknown).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Cap how many frames any selection may decode. Clamped to at least 1.
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames.max(1));
        self
    }

    /// Choose the best-frame ranking.
    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringStrategy) -> Self {
        self.scoring = scoring;
        self
    }

    /// Set the pixel budget in bits.
    ///
    /// Streams whose single frame exceeds it fail to open with
    /// [`ThumbError::TooBig`](crate::ThumbError::TooBig); it also bounds how
    /// many candidates best-frame mode may hold.
    #[must_use]
    pub fn with_pixel_budget(mut self, bits: u64) -> Self {
        self.pixel_budget = bits.max(1);
        self
    }

    /// Set how many decoded frames may wait for the signature thread.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the size of the FFmpeg I/O buffer.
    #[must_use]
    pub fn with_io_buffer_size(mut self, size: usize) -> Self {
        self.io_buffer_size = size.clamp(512, i32::MAX as usize);
        self
    }

    /// Prefer the `libvpx` decoders for VP8/VP9 so WebM alpha survives.
    #[must_use]
    pub fn with_prefer_libvpx(mut self, prefer: bool) -> Self {
        self.prefer_libvpx = prefer;
        self
    }

    /// The cancellation token shared with the session's callbacks.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = SessionOptions::default();
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.max_frames, None);
        assert_eq!(options.scoring, ScoringStrategy::Detail);
        assert_eq!(options.pixel_budget, 1 << 30);
        assert_eq!(options.io_buffer_size, 4096);
        assert!(options.prefer_libvpx);
        assert!(!options.is_cancelled());
    }

    #[test]
    fn builders_clamp_degenerate_values() {
        let options = SessionOptions::new()
            .with_batch_size(0)
            .with_max_frames(0)
            .with_channel_capacity(0)
            .with_io_buffer_size(1);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.max_frames, Some(1));
        assert_eq!(options.channel_capacity, 1);
        assert_eq!(options.io_buffer_size, 512);
    }

    #[test]
    fn debug_hides_callbacks() {
        let rendered = format!("{:?}", SessionOptions::new());
        assert!(rendered.starts_with("SessionOptions"));
        assert!(!rendered.contains("progress"));
    }

    #[test]
    fn shared_token_reflects_cancellation() {
        let token = CancellationToken::new();
        let options = SessionOptions::new().with_cancellation(token.clone());
        token.cancel();
        assert!(options.is_cancelled());
    }
}
