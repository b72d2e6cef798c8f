//! Frame selection: best-frame scoring and targeted search.
//!
//! Best-frame mode decodes a bounded run of frames from the start of the
//! stream. Decoding stays on the caller's thread; a scoped worker receives
//! each frame over a bounded channel, computes its [`Signature`] and folds
//! it into the session's [`FrameScorer`], keeping only the frames the scorer
//! asks for. The decode loop joins the worker before reading the verdict.
//!
//! Targeted modes walk forward from the nearest keyframe (or the current
//! position, for sources that cannot seek) until they reach the requested
//! frame index or timestamp, clamping to the last frame when the stream
//! ends first.

use std::{collections::BTreeMap, sync::mpsc, thread, time::Duration};

use ffmpeg_next::{Error as FfmpegError, Packet, format::context::Input};

use crate::{
    config::SessionOptions,
    conversion::pts_to_duration,
    cursor::{DecodedFrame, FrameCursor},
    error::ThumbError,
    progress::{OperationType, ProgressTracker},
    signature::{FrameScorer, Retention, Signature},
};

const DEFAULT_CANDIDATES: u64 = 100;
const SHORT_STREAM_FRAMES: i64 = 400;

/// What frame a selection should commit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectionRequest {
    /// Score the opening frames and keep the best one.
    #[default]
    Best,
    /// The n-th frame, 1-based. `0` is treated as `1`.
    Frame(u64),
    /// The last frame presented at or before this time.
    Duration(Duration),
    /// A fraction of the total duration, clamped to `0.0..=1.0`.
    Position(f64),
}

/// Where the committed frame sits in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedFrame {
    /// 1-based frame index.
    pub index: u64,
    /// Presentation time relative to the stream start.
    pub timestamp: Duration,
}

impl From<&DecodedFrame> for SelectedFrame {
    fn from(frame: &DecodedFrame) -> Self {
        Self {
            index: frame.index(),
            timestamp: frame.timestamp(),
        }
    }
}

/// Stream facts that bound best-frame mode.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CandidatePlan {
    pub(crate) attached_picture: bool,
    pub(crate) declared_frames: i64,
    pub(crate) bits_per_frame: u64,
}

impl CandidatePlan {
    /// How many frames best-frame mode may decode.
    pub(crate) fn limit(&self, pixel_budget: u64, max_frames: Option<u64>) -> u64 {
        let mut limit = if self.attached_picture {
            1
        } else if self.declared_frames > 0 && self.declared_frames < SHORT_STREAM_FRAMES {
            (self.declared_frames as u64 >> 2) + 1
        } else {
            DEFAULT_CANDIDATES
        };
        if self.bits_per_frame > 0 {
            limit = limit.min(pixel_budget / self.bits_per_frame);
        }
        if let Some(max_frames) = max_frames {
            limit = limit.min(max_frames);
        }
        limit.max(1)
    }
}

/// Borrowed session state for one selection.
pub(crate) struct Selector<'a> {
    pub(crate) input: &'a mut Input,
    pub(crate) cursor: &'a mut FrameCursor,
    pub(crate) options: &'a SessionOptions,
    pub(crate) seekable: bool,
}

impl Selector<'_> {
    fn tracker(&self, total: Option<u64>) -> ProgressTracker {
        ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::FrameScan,
            total,
            self.options.batch_size,
        )
    }

    fn check_cancelled(&self) -> Result<(), ThumbError> {
        if self.options.is_cancelled() {
            return Err(ThumbError::Unknown);
        }
        Ok(())
    }

    fn decode_next(&mut self) -> Result<Option<DecodedFrame>, ThumbError> {
        self.cursor.decode_next(self.input, &self.options.cancellation)
    }

    /// Score up to `plan.limit(..)` frames from the start and commit one.
    pub(crate) fn select_best(&mut self, plan: CandidatePlan) -> Result<DecodedFrame, ThumbError> {
        self.check_cancelled()?;
        if self.cursor.has_advanced() {
            if self.seekable {
                self.cursor.rewind(self.input)?;
            } else {
                log::warn!("Source cannot seek; scoring from the current position");
            }
        }

        let limit = plan.limit(self.options.pixel_budget, self.options.max_frames);
        let scorer = self.options.scoring.scorer();
        log::debug!("Scoring up to {limit} frames ({:?})", self.options.scoring);

        let mut tracker = self.tracker(Some(limit));
        let (winner, decoded) = thread::scope(|scope| {
            let (sender, receiver) = mpsc::sync_channel(self.options.channel_capacity);
            let worker = scope.spawn(move || score_candidates(scorer, receiver));

            let mut decoded = 0u64;
            let outcome = loop {
                if decoded >= limit {
                    break Ok(());
                }
                if let Err(error) = self.check_cancelled() {
                    break Err(error);
                }
                match self.decode_next() {
                    Ok(Some(frame)) => {
                        decoded += 1;
                        tracker.advance(Some(frame.timestamp()));
                        if sender.send(frame).is_err() {
                            break Err(ThumbError::Unknown);
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(error) => break Err(error),
                }
            };
            drop(sender);

            let winner = worker.join().map_err(|_| ThumbError::Unknown);
            outcome.and(winner).map(|winner| (winner, decoded))
        })?;
        tracker.finish();

        let frame = winner.ok_or(ThumbError::InvalidData)?;
        log::debug!(
            "Selected frame {} at {:?} out of {decoded} candidates",
            frame.index(),
            frame.timestamp()
        );
        Ok(frame)
    }

    /// Commit the `target`-th frame, or the last one if the stream is
    /// shorter.
    pub(crate) fn select_frame(
        &mut self,
        target: u64,
        previous: Option<DecodedFrame>,
    ) -> Result<DecodedFrame, ThumbError> {
        self.check_cancelled()?;
        let mut target = target.max(1);
        if let Some(max_frames) = self.options.max_frames {
            target = target.min(max_frames);
        }

        if previous.as_ref().is_some_and(|frame| frame.index() == target) {
            log::debug!("Frame {target} already selected");
            return previous.ok_or(ThumbError::InvalidData);
        }

        if target < self.cursor.next_index() || self.cursor.is_exhausted() {
            if self.seekable {
                self.cursor.rewind(self.input)?;
            } else {
                log::warn!("Source cannot seek; frame {target} is behind the read position");
            }
        }

        let mut tracker = self.tracker(Some(target));
        let mut last = previous;
        let result = loop {
            match self.decode_next() {
                Ok(Some(frame)) => {
                    tracker.advance(Some(frame.timestamp()));
                    if frame.index() >= target {
                        break Ok(frame);
                    }
                    last = Some(frame);
                }
                Ok(None) => {
                    log::debug!("Stream ended before frame {target}; clamping");
                    break last.ok_or(ThumbError::InvalidData);
                }
                Err(error) => break Err(error),
            }
        };
        tracker.finish();
        result
    }

    /// Commit the last frame presented at or before `target`.
    pub(crate) fn select_duration(
        &mut self,
        target: Duration,
        previous: Option<DecodedFrame>,
    ) -> Result<DecodedFrame, ThumbError> {
        self.check_cancelled()?;
        if self.seekable {
            if let Err(error) = self.cursor.seek_before(self.input, target) {
                self.check_cancelled()?;
                log::warn!("Seek to {target:?} failed ({error}); decoding from the start");
                self.cursor.rewind(self.input)?;
            }
        } else if self.cursor.has_advanced() && target < self.cursor.last_timestamp() {
            log::warn!("Source cannot seek; {target:?} is behind the read position");
        }

        let budget = self.options.max_frames.unwrap_or(u64::MAX);
        let mut tracker = self.tracker(None);
        let mut decoded = 0u64;
        let mut last: Option<DecodedFrame> = None;
        let result = loop {
            match self.decode_next() {
                Ok(Some(frame)) => {
                    decoded += 1;
                    tracker.advance(Some(frame.timestamp()));
                    if frame.timestamp() > target {
                        break Ok(last.unwrap_or(frame));
                    }
                    if decoded >= budget {
                        break Ok(frame);
                    }
                    last = Some(frame);
                }
                Ok(None) => break last.or(previous).ok_or(ThumbError::InvalidData),
                Err(error) => break Err(error),
            }
        };
        tracker.finish();
        result
    }

    /// Scan packet timestamps (no decoding) for the largest presentation
    /// time, then return to the start.
    pub(crate) fn probe_duration(&mut self) -> Result<Duration, ThumbError> {
        log::debug!("Container has no duration; scanning packets");
        self.cursor.rewind(self.input)?;

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::DurationProbe,
            None,
            self.options.batch_size,
        );
        let mut longest = Duration::ZERO;
        let outcome = loop {
            self.check_cancelled()?;
            let mut packet = Packet::empty();
            match packet.read(self.input) {
                Ok(()) => {
                    tracker.advance(None);
                    let Some(pts) = packet.pts() else {
                        continue;
                    };
                    if let Some(stream) = self.input.stream(packet.stream()) {
                        let end = pts_to_duration(pts, stream.start_time(), stream.time_base());
                        longest = longest.max(end);
                    }
                }
                Err(FfmpegError::Eof) => break Ok(longest),
                Err(error) => break Err(ThumbError::from(error)),
            }
        };
        tracker.finish();
        self.cursor.rewind(self.input)?;
        outcome
    }
}

/// Worker side of best-frame mode.
fn score_candidates(
    mut scorer: Box<dyn FrameScorer>,
    frames: mpsc::Receiver<DecodedFrame>,
) -> Option<DecodedFrame> {
    let mut retained: BTreeMap<usize, DecodedFrame> = BTreeMap::new();
    for (position, frame) in frames.into_iter().enumerate() {
        let signature = match Signature::from_frame(frame.video()) {
            Ok(signature) => signature,
            Err(error) => {
                log::debug!("Skipping frame {}: {error}", frame.index());
                continue;
            }
        };
        match scorer.observe(position, signature) {
            Retention::Discard => {}
            Retention::ReplaceBest => {
                retained.clear();
                retained.insert(position, frame);
            }
            Retention::Keep => {
                retained.insert(position, frame);
            }
        }
    }
    let winner = scorer.select()?;
    retained.remove(&winner)
}

/// Map a fractional position onto a duration. NaN counts as the start.
pub(crate) fn position_to_duration(duration: Duration, position: f64) -> Duration {
    let fraction = if position.is_nan() {
        0.0
    } else {
        position.clamp(0.0, 1.0)
    };
    duration.mul_f64(fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(attached_picture: bool, declared_frames: i64, bits_per_frame: u64) -> CandidatePlan {
        CandidatePlan {
            attached_picture,
            declared_frames,
            bits_per_frame,
        }
    }

    #[test]
    fn cover_art_scores_one_frame() {
        assert_eq!(plan(true, 0, 0).limit(1 << 30, None), 1);
    }

    #[test]
    fn short_streams_score_a_quarter() {
        assert_eq!(plan(false, 100, 0).limit(1 << 30, None), 26);
        assert_eq!(plan(false, 399, 0).limit(1 << 30, None), 100);
        assert_eq!(plan(false, 3, 0).limit(1 << 30, None), 1);
    }

    #[test]
    fn long_or_unknown_streams_score_a_hundred() {
        assert_eq!(plan(false, 0, 0).limit(1 << 30, None), 100);
        assert_eq!(plan(false, 10_000, 0).limit(1 << 30, None), 100);
    }

    #[test]
    fn pixel_budget_and_caller_cap_bound_the_run() {
        let bits_1080p = 12 * 1920 * 1080;
        assert_eq!(plan(false, 0, bits_1080p).limit(1 << 30, None), 43);
        assert_eq!(plan(false, 0, bits_1080p).limit(1 << 30, Some(5)), 5);
        assert_eq!(plan(false, 0, 1 << 31).limit(1 << 30, None), 1);
    }

    #[test]
    fn positions_clamp_and_ignore_nan() {
        let duration = Duration::from_secs(10);
        assert_eq!(position_to_duration(duration, 0.5), Duration::from_secs(5));
        assert_eq!(position_to_duration(duration, -1.0), Duration::ZERO);
        assert_eq!(position_to_duration(duration, 7.0), duration);
        assert_eq!(position_to_duration(duration, f64::NAN), Duration::ZERO);
    }

    #[test]
    fn default_request_is_best() {
        assert_eq!(SelectionRequest::default(), SelectionRequest::Best);
    }
}
