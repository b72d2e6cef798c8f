//! # thumbframe
//!
//! Pick one representative still frame, plus metadata, out of a video or
//! audio-with-cover-art byte stream, for use as a thumbnail source.
//!
//! `thumbframe` opens an FFmpeg demuxer and decoder directly over any
//! [`Read`](std::io::Read) (optionally [`Seek`](std::io::Seek)) source via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next), walks decoded
//! frames, scores or addresses them, and hands back a packed RGB/RGBA
//! buffer. Every native handle is owned by a [`MediaSession`] and released
//! exactly once.
//!
//! ## Quick Start
//!
//! ### Best frame
//!
//! ```no_run
//! use thumbframe::{ByteSource, MediaSession};
//!
//! let mut session = MediaSession::open(ByteSource::open_file("input.mp4")?)?;
//! let frame = session.thumbnail(3)?;
//! frame.to_image()?.save("thumb.jpg")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### A specific moment
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use thumbframe::{ByteSource, MediaSession, SelectionRequest, ThumbError};
//!
//! let bytes = std::fs::read("input.webm").map_err(ThumbError::from)?;
//! let mut session = MediaSession::open(ByteSource::from_bytes(bytes))?;
//!
//! session.select(SelectionRequest::Duration(Duration::from_secs(3)))?;
//! let rgba = session.export(4)?;
//!
//! session.select(SelectionRequest::Position(0.5))?;
//! let midpoint = session.export(3)?;
//! # Ok::<(), ThumbError>(())
//! ```
//!
//! ### Metadata only
//!
//! ```no_run
//! use thumbframe::{ByteSource, MediaSession, ThumbError};
//!
//! let session = MediaSession::open(ByteSource::open_file("song.mp3")?)?;
//! let json = serde_json::to_string(session.metadata()).expect("serialisable");
//! println!("{json}");
//! # Ok::<(), ThumbError>(())
//! ```
//!
//! ## Features
//!
//! - **Any byte source**: streams, seekable readers, in-memory buffers and
//!   files, bridged to FFmpeg through custom AVIO callbacks
//! - **Best-frame scoring**: histogram signatures computed on a background
//!   thread, with a pluggable [`FrameScorer`]
//! - **Targeted selection**: by frame index, timestamp or fractional
//!   position, clamped to the end of the stream
//! - **Cooperative cancellation** through a shared [`CancellationToken`]
//! - **Log bridging**: FFmpeg's log lines relayed into the `log` facade
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | [`thumbnail_async`] runs a full cycle on a Tokio blocking thread |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod config;
mod conversion;
pub mod cursor;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod metadata;
pub mod progress;
pub mod selector;
pub mod session;
pub mod signature;
pub mod source;
#[cfg(feature = "async")]
pub mod stream;

pub use config::{DEFAULT_IO_BUFFER_SIZE, DEFAULT_PIXEL_BUDGET, ScoringStrategy, SessionOptions};
pub use cursor::DecodedFrame;
pub use error::ThumbError;
pub use export::ExportedFrame;
pub use ffmpeg::{
    FfmpegLogLevel, LogHandler, clear_log_handler, ffmpeg_log_level, install_log_bridge,
    set_ffmpeg_log_level, set_log_handler,
};
pub use metadata::{Metadata, Orientation};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use selector::{SelectedFrame, SelectionRequest};
pub use session::MediaSession;
pub use signature::{DetailScorer, FrameScorer, RepresentativeScorer, Retention, Signature};
pub use source::{ByteSource, active_sources};
#[cfg(feature = "async")]
pub use stream::{ThumbnailFuture, thumbnail_async};
