//! Core [`MediaSession`] implementation.
//!
//! A session owns every native handle needed to turn one byte source into
//! one thumbnail frame: the custom I/O context, the demuxer, the decoder
//! (inside the frame cursor) and the currently selected frame. Metadata is
//! read eagerly at open time so it is available before any decoding.
//!
//! Handles are released in reverse order of acquisition, exactly once, by
//! [`MediaSession::close`] or by `Drop`.

use std::{
    ffi::c_int,
    fmt::{Debug, Formatter, Result as FmtResult},
    ptr,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use ffmpeg_next::{
    codec::{Id as CodecId, context::Context as CodecContext},
    decoder,
    format::{context::Input, stream::Disposition},
    media::Type,
};
use ffmpeg_sys_next::AVPixelFormat;

use crate::{
    config::SessionOptions,
    conversion::{NO_PTS, pts_to_duration, rational_to_f64},
    cursor::{DecodedFrame, FrameCursor, container_start_time},
    error::ThumbError,
    export::{ExportedFrame, export_frame},
    metadata::{Metadata, Orientation},
    selector::{CandidatePlan, SelectedFrame, SelectionRequest, Selector, position_to_duration},
    signature::{FLAG_ALPHA, pixel_descriptor},
    source::{ByteSource, CustomIo},
};

const AVFMT_FLAG_CUSTOM_IO: c_int = 0x0080;

/// Stream probing and codec opening are not reentrant in older FFmpeg
/// builds.
static OPEN_LOCK: Mutex<()> = Mutex::new(());

/// A thumbnail-extraction session over one byte source.
///
/// Created with [`MediaSession::open`]. Every operation takes `&mut self`;
/// share a session across threads only behind a mutex.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use thumbframe::{ByteSource, MediaSession, ThumbError};
///
/// let mut session = MediaSession::open(ByteSource::open_file("input.mp4")?)?;
/// println!("{:?}", session.metadata());
///
/// session.select_duration(Duration::from_secs(5))?;
/// let frame = session.export(3)?;
/// assert_eq!(frame.data().len(), (frame.width() * frame.height() * 3) as usize);
///
/// session.close();
/// # Ok::<(), ThumbError>(())
/// ```
pub struct MediaSession {
    // Field order is drop order.
    selection: Option<DecodedFrame>,
    cursor: Option<FrameCursor>,
    input: Option<Input>,
    io: Option<CustomIo>,
    options: SessionOptions,
    metadata: Metadata,
    plan: CandidatePlan,
    seekable: bool,
    closed: bool,
}

impl Debug for MediaSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaSession")
            .field("metadata", &self.metadata)
            .field("selected", &self.selected())
            .field("seekable", &self.seekable)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl MediaSession {
    /// Open a session with default options.
    ///
    /// # Errors
    ///
    /// See [`open_with_options`](MediaSession::open_with_options).
    pub fn open(source: ByteSource) -> Result<Self, ThumbError> {
        Self::open_with_options(source, SessionOptions::default())
    }

    /// Open a session.
    ///
    /// Probes the container, picks the best video stream, records whether
    /// an audio stream exists, reads orientation and tags, and opens a
    /// decoder. A source without video opens successfully with
    /// `has_video == false`.
    ///
    /// # Errors
    ///
    /// - [`ThumbError::InvalidData`] if the container cannot be parsed or
    ///   the video stream has no known pixel format.
    /// - [`ThumbError::TooBig`] if one frame exceeds the pixel budget.
    /// - [`ThumbError::DecoderNotFound`] if there are no audio or video
    ///   streams, or no decoder for the video codec.
    /// - [`ThumbError::Unknown`] if the cancellation token fired or the
    ///   source failed.
    pub fn open_with_options(source: ByteSource, options: SessionOptions) -> Result<Self, ThumbError> {
        crate::ffmpeg::init()?;
        if options.is_cancelled() {
            return Err(ThumbError::Unknown);
        }
        log::debug!("Opening session over {source:?}");

        let seekable = source.is_seekable();
        let mut io = CustomIo::new(source, options.cancellation.clone(), options.io_buffer_size)?;
        let input = open_input(&mut io).map_err(|error| match error {
            ThumbError::EndOfStream => ThumbError::InvalidData,
            other => other,
        })?;

        let mut session = Self {
            selection: None,
            cursor: None,
            input: Some(input),
            io: Some(io),
            options,
            metadata: Metadata::default(),
            plan: CandidatePlan::default(),
            seekable,
            closed: false,
        };
        session.probe()?;
        Ok(session)
    }

    /// Read container and stream metadata and open the video decoder.
    fn probe(&mut self) -> Result<(), ThumbError> {
        let input = self.input.as_ref().ok_or(ThumbError::Unknown)?;

        let tags = input.metadata();
        self.metadata.title = tags.get("title").unwrap_or_default().to_string();
        self.metadata.artist = tags.get("artist").unwrap_or_default().to_string();
        self.metadata.has_audio = input.streams().best(Type::Audio).is_some();
        if input.duration() > 0 {
            self.metadata.duration = Duration::from_micros(input.duration() as u64);
        }

        let Some(stream) = input.streams().best(Type::Video) else {
            if !self.metadata.has_audio {
                log::debug!("No audio or video streams");
                return Err(ThumbError::DecoderNotFound);
            }
            log::debug!("No video stream; metadata only");
            return Ok(());
        };
        self.metadata.has_video = true;

        let parameters = stream.parameters();
        let (width, height) = unsafe {
            let raw = &*parameters.as_ptr();
            (raw.width, raw.height)
        };
        self.metadata.width = u32::try_from(width).unwrap_or(0);
        self.metadata.height = u32::try_from(height).unwrap_or(0);
        self.metadata.orientation = stream_orientation(&parameters);

        let attached_picture = stream.disposition().contains(Disposition::ATTACHED_PIC);
        let time_base = stream.time_base();
        if self.metadata.duration.is_zero() && stream.duration() > 0 {
            self.metadata.duration = pts_to_duration(stream.duration(), 0, time_base);
        }
        let frame_rate = if attached_picture {
            None
        } else {
            rational_to_f64(stream.avg_frame_rate()).or_else(|| rational_to_f64(stream.rate()))
        };
        self.metadata.fps = frame_rate;

        let codec_id = parameters.id();
        let preferred = match codec_id {
            CodecId::VP8 if self.options.prefer_libvpx => decoder::find_by_name("libvpx"),
            CodecId::VP9 if self.options.prefer_libvpx => decoder::find_by_name("libvpx-vp9"),
            _ => None,
        };
        let codec = preferred
            .or_else(|| decoder::find(codec_id))
            .ok_or(ThumbError::DecoderNotFound)?;

        let context = CodecContext::from_parameters(parameters)?;
        let pixel_format = unsafe { (*context.as_ptr()).pix_fmt };
        if pixel_format == AVPixelFormat::AV_PIX_FMT_NONE {
            log::debug!("Video stream has no pixel format");
            return Err(ThumbError::InvalidData);
        }
        let bits_per_pixel = pixel_descriptor(pixel_format)
            .map(|descriptor| unsafe { ffmpeg_sys_next::av_get_bits_per_pixel(descriptor) })
            .unwrap_or(0);
        let bits_per_frame = u64::try_from(bits_per_pixel).unwrap_or(0)
            * u64::from(self.metadata.width)
            * u64::from(self.metadata.height);
        if bits_per_frame > self.options.pixel_budget {
            log::debug!(
                "{}x{} frame needs {bits_per_frame} bits",
                self.metadata.width,
                self.metadata.height
            );
            return Err(ThumbError::TooBig);
        }

        let video_decoder = {
            let _guard = OPEN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            context.decoder().open_as(codec)?.video()?
        };
        self.metadata.has_alpha = pixel_descriptor(video_decoder.format().into())
            .is_some_and(|descriptor| descriptor.flags & FLAG_ALPHA != 0);

        log::info!(
            "Opened {} stream {} ({}x{}, decoder {})",
            if attached_picture { "cover art" } else { "video" },
            stream.index(),
            self.metadata.width,
            self.metadata.height,
            codec.name()
        );

        self.plan = CandidatePlan {
            attached_picture,
            declared_frames: stream.frames(),
            bits_per_frame,
        };
        self.cursor = Some(FrameCursor::new(
            video_decoder,
            stream.index(),
            time_base,
            if stream.start_time() == NO_PTS { 0 } else { stream.start_time() },
            container_start_time(input),
            frame_rate,
        ));
        Ok(())
    }

    /// The metadata snapshot.
    ///
    /// Available right after open. Duration and frame rate are refined
    /// from decoded timestamps when the container did not declare them.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Whether FFmpeg may seek the underlying source.
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Whether [`close`](MediaSession::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The committed frame, if any.
    pub fn selected(&self) -> Option<SelectedFrame> {
        self.selection.as_ref().map(SelectedFrame::from)
    }

    /// Run a selection described by `request`.
    ///
    /// # Errors
    ///
    /// See the individual `select_*` methods.
    pub fn select(&mut self, request: SelectionRequest) -> Result<SelectedFrame, ThumbError> {
        match request {
            SelectionRequest::Best => self.select_best(),
            SelectionRequest::Frame(index) => self.select_frame(index),
            SelectionRequest::Duration(target) => self.select_duration(target),
            SelectionRequest::Position(position) => self.select_position(position),
        }
    }

    /// Score the opening frames and commit the best one.
    ///
    /// Cover art yields its single picture. Streams declaring fewer than
    /// 400 frames score a quarter of them; others score 100, all bounded
    /// by the pixel budget and `max_frames`.
    ///
    /// # Errors
    ///
    /// - [`ThumbError::DecoderNotFound`] without a video stream.
    /// - [`ThumbError::InvalidData`] if no frame could be decoded.
    /// - [`ThumbError::Unknown`] after close or cancellation.
    pub fn select_best(&mut self) -> Result<SelectedFrame, ThumbError> {
        let plan = self.plan;
        self.run_selection(|selector, previous| {
            drop(previous);
            selector.select_best(plan)
        })
    }

    /// Commit the `index`-th frame (1-based; `0` means `1`).
    ///
    /// An index past the end of the stream commits the last frame.
    ///
    /// # Errors
    ///
    /// As for [`select_best`](MediaSession::select_best).
    pub fn select_frame(&mut self, index: u64) -> Result<SelectedFrame, ThumbError> {
        self.run_selection(|selector, previous| selector.select_frame(index, previous))
    }

    /// Commit the last frame presented at or before `target`.
    ///
    /// When the nearest keyframe already lies past `target` the first
    /// decoded frame is committed; a target past the end commits the last
    /// frame.
    ///
    /// # Errors
    ///
    /// As for [`select_best`](MediaSession::select_best).
    pub fn select_duration(&mut self, target: Duration) -> Result<SelectedFrame, ThumbError> {
        self.run_selection(|selector, previous| selector.select_duration(target, previous))
    }

    /// Commit the frame at `position * duration`.
    ///
    /// `position` is clamped to `0.0..=1.0` and NaN counts as `0.0`. If the
    /// container omitted its duration and the source is seekable, packet
    /// timestamps are scanned to recover it first.
    ///
    /// # Errors
    ///
    /// As for [`select_best`](MediaSession::select_best).
    pub fn select_position(&mut self, position: f64) -> Result<SelectedFrame, ThumbError> {
        self.ensure_usable()?;
        if self.metadata.duration.is_zero() && self.metadata.has_video {
            if self.seekable {
                let duration = self.run_probe()?;
                self.metadata.duration = duration;
            } else {
                log::warn!("Unknown duration on a non-seekable source; using the start");
            }
        }
        let target = position_to_duration(self.metadata.duration, position);
        self.select_duration(target)
    }

    /// Convert the committed frame to packed pixels.
    ///
    /// `bands` is 3 for RGB or 4 for RGBA; other values fall back to 3.
    ///
    /// # Errors
    ///
    /// - [`ThumbError::InvalidData`] if nothing is selected.
    /// - [`ThumbError::Unknown`] after close.
    pub fn export(&self, bands: u8) -> Result<ExportedFrame, ThumbError> {
        if self.closed {
            return Err(ThumbError::Unknown);
        }
        let frame = self.selection.as_ref().ok_or(ThumbError::InvalidData)?;
        export_frame(frame.video(), bands)
    }

    /// Select the best frame unless something is already selected, then
    /// export it.
    ///
    /// # Errors
    ///
    /// As for [`select_best`](MediaSession::select_best) and
    /// [`export`](MediaSession::export).
    pub fn thumbnail(&mut self, bands: u8) -> Result<ExportedFrame, ThumbError> {
        if self.selection.is_none() {
            self.select_best()?;
        }
        self.export(bands)
    }

    /// Release every native handle. Idempotent.
    ///
    /// Teardown runs in reverse order of acquisition: the committed frame,
    /// the decoder, the demuxer, then the I/O context and its source.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        drop(self.selection.take());
        drop(self.cursor.take());
        drop(self.input.take());
        drop(self.io.take());
        log::debug!("Session closed");
    }

    // ── Private helpers ────────────────────────────────────────────

    fn ensure_usable(&self) -> Result<(), ThumbError> {
        if self.closed || self.options.is_cancelled() {
            return Err(ThumbError::Unknown);
        }
        Ok(())
    }

    fn selector(&mut self) -> Result<Selector<'_>, ThumbError> {
        self.ensure_usable()?;
        let cursor = self.cursor.as_mut().ok_or(ThumbError::DecoderNotFound)?;
        let input = self.input.as_mut().ok_or(ThumbError::Unknown)?;
        Ok(Selector {
            input,
            cursor,
            options: &self.options,
            seekable: self.seekable,
        })
    }

    fn run_selection<F>(&mut self, select: F) -> Result<SelectedFrame, ThumbError>
    where
        F: FnOnce(&mut Selector<'_>, Option<DecodedFrame>) -> Result<DecodedFrame, ThumbError>,
    {
        let previous = self.selection.take();
        let mut selector = self.selector()?;
        let frame = select(&mut selector, previous)?;
        let selected = SelectedFrame::from(&frame);

        if let Some(descriptor) = pixel_descriptor(frame.video().format().into()) {
            self.metadata.has_alpha |= descriptor.flags & FLAG_ALPHA != 0;
        }
        self.selection = Some(frame);
        self.refine_metadata();
        Ok(selected)
    }

    fn run_probe(&mut self) -> Result<Duration, ThumbError> {
        self.selector()?.probe_duration()
    }

    /// Fill in duration and frame rate from what decoding has seen.
    fn refine_metadata(&mut self) {
        let Some(cursor) = self.cursor.as_ref() else {
            return;
        };
        if self.metadata.duration.is_zero() && cursor.is_exhausted() {
            self.metadata.duration = cursor.last_timestamp();
        }
        if self.metadata.fps.is_none() && !self.plan.attached_picture {
            let elapsed = cursor.last_timestamp().as_secs_f64();
            if cursor.last_index() > 1 && elapsed > 0.0 {
                self.metadata.fps = Some((cursor.last_index() - 1) as f64 / elapsed);
            }
        }
        if self.metadata.width == 0 {
            self.metadata.width = cursor.decoder().width();
            self.metadata.height = cursor.decoder().height();
        }
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open the demuxer over a custom I/O context and probe its streams.
fn open_input(io: &mut CustomIo) -> Result<Input, ThumbError> {
    unsafe {
        let mut context = ffmpeg_sys_next::avformat_alloc_context();
        if context.is_null() {
            return Err(ThumbError::OutOfMemory);
        }
        (*context).pb = io.as_mut_ptr();
        (*context).flags |= AVFMT_FLAG_CUSTOM_IO;
        (*context).interrupt_callback = io.interrupt_callback();

        // Frees `context` (but not our pb) on failure.
        let status = ffmpeg_sys_next::avformat_open_input(
            &mut context,
            ptr::null(),
            ptr::null(),
            ptr::null_mut(),
        );
        if status < 0 {
            log::debug!("avformat_open_input failed ({status})");
            return Err(ThumbError::from_code(status));
        }
        let input = Input::wrap(context);

        let status = {
            let _guard = OPEN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            ffmpeg_sys_next::avformat_find_stream_info(context, ptr::null_mut())
        };
        if status < 0 {
            log::debug!("avformat_find_stream_info failed ({status})");
            return Err(ThumbError::from_code(status));
        }
        log::debug!(
            "Opened {} input ({})",
            input.format().name(),
            if io.is_seekable() { "seekable" } else { "stream" }
        );
        Ok(input)
    }
}

/// Orientation from the stream's display matrix side data.
fn stream_orientation(parameters: &ffmpeg_next::codec::Parameters) -> Orientation {
    unsafe {
        let raw = &*parameters.as_ptr();
        let side_data = ffmpeg_sys_next::av_packet_side_data_get(
            raw.coded_side_data,
            raw.nb_coded_side_data,
            ffmpeg_sys_next::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if side_data.is_null() || (*side_data).data.is_null() || (*side_data).size < 36 {
            return Orientation::Normal;
        }
        let rotation = ffmpeg_sys_next::av_display_rotation_get((*side_data).data as *const i32);
        Orientation::from_display_rotation(rotation)
    }
}
