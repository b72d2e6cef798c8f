//! Forward decoding over the selected video stream.
//!
//! [`FrameCursor`] owns the session's only decoder. It pulls packets from
//! the demuxer, skips packets of other streams, feeds the decoder and hands
//! back decoded frames stamped with a presentation time and a 1-based index.
//! It also remembers the highest index and timestamp it has produced, which
//! is what targeted selection clamps to.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    time::Duration,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::decoder::Video as VideoDecoder,
    format::context::Input,
    frame::Video as VideoFrame,
    util::error::EAGAIN,
};

use crate::{
    conversion::{NO_PTS, duration_to_seek_timestamp, pts_to_duration, timestamp_to_frame_number},
    error::ThumbError,
    progress::CancellationToken,
};

/// Packets the decoder may reject while fetching one frame before the
/// error is surfaced.
const MAX_REJECTED_PACKETS: u32 = 10;

/// A decoded picture with its position in the stream.
pub struct DecodedFrame {
    frame: VideoFrame,
    index: u64,
    timestamp: Duration,
}

impl Debug for DecodedFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DecodedFrame")
            .field("index", &self.index)
            .field("timestamp", &self.timestamp)
            .field("width", &self.frame.width())
            .field("height", &self.frame.height())
            .finish_non_exhaustive()
    }
}

impl DecodedFrame {
    /// 1-based position of the frame in the stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Presentation time relative to the stream start.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub(crate) fn video(&self) -> &VideoFrame {
        &self.frame
    }
}

pub(crate) struct FrameCursor {
    decoder: VideoDecoder,
    stream_index: usize,
    time_base: Rational,
    start_time: i64,
    container_start: i64,
    frame_rate: Option<f64>,
    next_index: u64,
    anchored: bool,
    last_index: u64,
    last_timestamp: Duration,
    rejected_packets: u32,
    eof_sent: bool,
    done: bool,
}

impl FrameCursor {
    pub(crate) fn new(
        decoder: VideoDecoder,
        stream_index: usize,
        time_base: Rational,
        start_time: i64,
        container_start: i64,
        frame_rate: Option<f64>,
    ) -> Self {
        Self {
            decoder,
            stream_index,
            time_base,
            start_time,
            container_start,
            frame_rate,
            next_index: 1,
            anchored: true,
            last_index: 0,
            last_timestamp: Duration::ZERO,
            rejected_packets: 0,
            eof_sent: false,
            done: false,
        }
    }

    pub(crate) fn decoder(&self) -> &VideoDecoder {
        &self.decoder
    }

    /// Index the next decoded frame will carry, when known.
    pub(crate) fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Whether any frame has been decoded since open or the last rewind.
    pub(crate) fn has_advanced(&self) -> bool {
        !self.anchored || self.next_index > 1
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.done
    }

    pub(crate) fn last_index(&self) -> u64 {
        self.last_index
    }

    pub(crate) fn last_timestamp(&self) -> Duration {
        self.last_timestamp
    }

    /// Decode the next frame of the selected stream.
    ///
    /// Returns `Ok(None)` once the demuxer is exhausted and the decoder
    /// drained.
    pub(crate) fn decode_next(
        &mut self,
        input: &mut Input,
        cancellation: &CancellationToken,
    ) -> Result<Option<DecodedFrame>, ThumbError> {
        if self.done {
            return Ok(None);
        }

        loop {
            if cancellation.is_cancelled() {
                return Err(ThumbError::Unknown);
            }

            let mut frame = VideoFrame::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(Some(self.stamp(frame))),
                Err(FfmpegError::Eof) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => {}
                Err(error) => return Err(error.into()),
            }

            if self.eof_sent {
                self.done = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(error) = self.decoder.send_packet(&packet) {
                        if !self.tolerate_rejected_packet() {
                            log::warn!("Decoder rejected {} packets in a row", self.rejected_packets);
                            return Err(error.into());
                        }
                        log::debug!("Decoder rejected a packet: {error}");
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Jump to the keyframe at or before `target` and flush the decoder.
    ///
    /// Frame indices after the seek are derived from timestamps and the
    /// frame rate.
    pub(crate) fn seek_before(&mut self, input: &mut Input, target: Duration) -> Result<(), ThumbError> {
        let timestamp = duration_to_seek_timestamp(target).saturating_add(self.container_start);
        log::debug!("Seeking to {target:?} (ts={timestamp})");
        input.seek(timestamp, ..timestamp)?;
        self.reset();
        self.anchored = target.is_zero();
        if self.anchored {
            self.next_index = 1;
        }
        Ok(())
    }

    /// Return to the first frame.
    pub(crate) fn rewind(&mut self, input: &mut Input) -> Result<(), ThumbError> {
        self.seek_before(input, Duration::ZERO)
    }

    /// Count one rejected packet. `false` once the allowance for the
    /// current frame is used up.
    fn tolerate_rejected_packet(&mut self) -> bool {
        self.rejected_packets = self.rejected_packets.saturating_add(1);
        self.rejected_packets <= MAX_REJECTED_PACKETS
    }

    fn reset(&mut self) {
        self.decoder.flush();
        self.rejected_packets = 0;
        self.eof_sent = false;
        self.done = false;
    }

    fn stamp(&mut self, frame: VideoFrame) -> DecodedFrame {
        let timestamp = match frame.timestamp().or(frame.pts()) {
            Some(pts) => pts_to_duration(pts, self.start_time, self.time_base),
            None => self.last_timestamp,
        };
        let index = if self.anchored {
            self.next_index
        } else {
            self.anchored = true;
            self.frame_rate
                .map(|fps| timestamp_to_frame_number(timestamp, fps))
                .unwrap_or(self.next_index)
        };
        self.rejected_packets = 0;
        self.next_index = index.saturating_add(1);
        self.last_index = self.last_index.max(index);
        self.last_timestamp = self.last_timestamp.max(timestamp);
        DecodedFrame {
            frame,
            index,
            timestamp,
        }
    }
}

/// Container start time in AV_TIME_BASE, zero when unset.
pub(crate) fn container_start_time(input: &Input) -> i64 {
    let start = unsafe { (*input.as_ptr()).start_time };
    if start == NO_PTS { 0 } else { start }
}
