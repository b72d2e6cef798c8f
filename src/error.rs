//! Error types for the `thumbframe` crate.
//!
//! This module defines [`ThumbError`], the fixed error taxonomy returned by
//! every fallible operation in the crate. Native FFmpeg status codes are
//! folded into it by [`ThumbError::from_code`] and the [`From`]
//! conversions, so callers never see raw `AVERROR` values.

use std::{ffi::c_int, io::Error as IoError};

use ffmpeg_next::{Error as FfmpegError, util::error::ENOMEM};
use thiserror::Error;

const fn mktag(a: u8, b: u8, c: u8, d: u8) -> c_int {
    (a as c_int) | ((b as c_int) << 8) | ((c as c_int) << 16) | ((d as c_int) << 24)
}

/// Native status code reported for oversized frames, `FFERRTAG('H','M','M','M')`.
pub const TOO_BIG_CODE: c_int = -mktag(b'H', b'M', b'M', b'M');

/// The error taxonomy for all `thumbframe` operations.
///
/// The set of kinds is deliberately small: hosts are expected to treat any
/// error as "unsupported input" and substitute a fallback image, so the
/// variants only distinguish what a host might want to log or count.
///
/// [`ThumbError::EndOfStream`] is an internal sentinel. Public operations
/// treat end of stream as a successful end of scanning and never return it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ThumbError {
    /// A native allocation failed.
    #[error("ffmpeg: cannot allocate memory")]
    OutOfMemory,

    /// The demuxer or decoder has no more data.
    #[error("ffmpeg: end of file")]
    EndOfStream,

    /// Unclassified native failure, I/O callback failure, cancellation, or
    /// use of a session after it was closed.
    #[error("ffmpeg: unknown error occurred")]
    Unknown,

    /// No usable video stream, or the decoder was never created.
    #[error("ffmpeg: decoder not found")]
    DecoderNotFound,

    /// Malformed, truncated or undecodable container or frame data.
    #[error("ffmpeg: invalid data found when processing input")]
    InvalidData,

    /// Frame dimensions exceed the configured pixel budget.
    #[error("ffmpeg: video or cover art size exceeds maximum allowed dimensions")]
    TooBig,
}

impl ThumbError {
    /// Map a native FFmpeg status code onto the taxonomy.
    ///
    /// Non-negative codes are not errors; they map to [`ThumbError::Unknown`]
    /// only so that the function is total.
    pub fn from_code(code: c_int) -> Self {
        if code == TOO_BIG_CODE {
            return ThumbError::TooBig;
        }
        FfmpegError::from(code).into()
    }

    /// The native status code this kind corresponds to.
    pub fn code(self) -> c_int {
        match self {
            ThumbError::OutOfMemory => FfmpegError::Other { errno: ENOMEM }.into(),
            ThumbError::EndOfStream => FfmpegError::Eof.into(),
            ThumbError::Unknown => FfmpegError::Unknown.into(),
            ThumbError::DecoderNotFound => FfmpegError::DecoderNotFound.into(),
            ThumbError::InvalidData => FfmpegError::InvalidData.into(),
            ThumbError::TooBig => TOO_BIG_CODE,
        }
    }
}

impl From<FfmpegError> for ThumbError {
    fn from(error: FfmpegError) -> Self {
        match error {
            FfmpegError::Eof => ThumbError::EndOfStream,
            FfmpegError::InvalidData => ThumbError::InvalidData,
            FfmpegError::DecoderNotFound | FfmpegError::StreamNotFound => {
                ThumbError::DecoderNotFound
            }
            FfmpegError::Other { errno } if errno == ENOMEM => ThumbError::OutOfMemory,
            other => {
                log::debug!("Unclassified FFmpeg error: {other}");
                ThumbError::Unknown
            }
        }
    }
}

impl From<IoError> for ThumbError {
    fn from(error: IoError) -> Self {
        log::debug!("I/O error: {error}");
        ThumbError::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_taxonomy() {
        for kind in [
            ThumbError::OutOfMemory,
            ThumbError::EndOfStream,
            ThumbError::Unknown,
            ThumbError::DecoderNotFound,
            ThumbError::InvalidData,
            ThumbError::TooBig,
        ] {
            assert_eq!(ThumbError::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn exit_maps_to_unknown() {
        let code: c_int = FfmpegError::Exit.into();
        assert_eq!(ThumbError::from_code(code), ThumbError::Unknown);
    }

    #[test]
    fn stream_not_found_is_decoder_not_found() {
        assert_eq!(
            ThumbError::from(FfmpegError::StreamNotFound),
            ThumbError::DecoderNotFound
        );
    }

    #[test]
    fn too_big_tag_matches_native_layout() {
        assert_eq!(TOO_BIG_CODE, -0x4D4D_4D48);
    }

    #[test]
    fn messages_carry_ffmpeg_prefix() {
        assert_eq!(
            ThumbError::InvalidData.to_string(),
            "ffmpeg: invalid data found when processing input"
        );
        assert!(ThumbError::TooBig.to_string().contains("maximum allowed"));
    }

    #[test]
    fn io_errors_are_unknown() {
        let error = IoError::other("broken pipe");
        assert_eq!(ThumbError::from(error), ThumbError::Unknown);
    }
}
