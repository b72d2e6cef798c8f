//! Error handling integration tests.
//!
//! These tests verify that each failure condition maps onto the expected
//! error kind.

use std::{io::Read, path::Path};

use thumbframe::{ByteSource, MediaSession, SessionOptions, ThumbError};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const SAMPLE_AUDIO: &str = "tests/fixtures/sample_audio.mp3";

#[test]
fn open_missing_file() {
    let result = ByteSource::open_file("this_file_does_not_exist.mp4");
    assert_eq!(result.unwrap_err(), ThumbError::Unknown);
}

#[test]
fn open_garbage_bytes() {
    let result = MediaSession::open(ByteSource::from_bytes(b"this is not a media file".to_vec()));
    assert!(result.is_err(), "Expected error for garbage input");
}

#[test]
fn open_empty_source() {
    let result = MediaSession::open(ByteSource::from_bytes(Vec::new()));
    assert_eq!(result.unwrap_err(), ThumbError::InvalidData);
}

#[test]
fn open_zero_stream() {
    let zeros = std::io::repeat(0).take(256 * 1024);
    let result = MediaSession::open(ByteSource::from_reader(zeros, None));
    assert!(result.is_err(), "Expected error for a stream of zeros");
}

#[test]
fn truncated_container_is_invalid() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut bytes = std::fs::read(SAMPLE_VIDEO).expect("Failed to read fixture");
    bytes.truncate(4096);
    let result = MediaSession::open(ByteSource::from_bytes(bytes));
    assert_eq!(result.unwrap_err(), ThumbError::InvalidData);
}

#[test]
fn audio_only_has_metadata_but_no_frames() {
    if !Path::new(SAMPLE_AUDIO).exists() {
        return;
    }

    let source = ByteSource::open_file(SAMPLE_AUDIO).expect("Failed to open fixture");
    let mut session = MediaSession::open(source).expect("Audio-only input should open");

    let metadata = session.metadata();
    assert!(!metadata.has_video);
    assert!(metadata.has_audio);
    assert!(!metadata.duration.is_zero());
    assert_eq!((metadata.width, metadata.height), (0, 0));

    assert_eq!(session.select_best().unwrap_err(), ThumbError::DecoderNotFound);
    assert_eq!(session.select_frame(1).unwrap_err(), ThumbError::DecoderNotFound);
    assert_eq!(session.select_position(0.5).unwrap_err(), ThumbError::DecoderNotFound);
    assert_eq!(session.thumbnail(3).unwrap_err(), ThumbError::DecoderNotFound);
    assert_eq!(session.export(3).unwrap_err(), ThumbError::InvalidData);
}

#[test]
fn export_requires_selection() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let source = ByteSource::open_file(SAMPLE_VIDEO).expect("Failed to open fixture");
    let session = MediaSession::open(source).expect("Failed to open session");
    assert_eq!(session.export(3).unwrap_err(), ThumbError::InvalidData);
}

#[test]
fn operations_after_close_fail() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let source = ByteSource::open_file(SAMPLE_VIDEO).expect("Failed to open fixture");
    let mut session = MediaSession::open(source).expect("Failed to open session");
    session.select_frame(3).expect("Failed to select");
    let metadata = session.metadata().clone();

    session.close();
    session.close();
    assert!(session.is_closed());
    assert!(session.selected().is_none());
    assert_eq!(session.metadata(), &metadata);

    assert_eq!(session.select_best().unwrap_err(), ThumbError::Unknown);
    assert_eq!(session.select_frame(1).unwrap_err(), ThumbError::Unknown);
    assert_eq!(session.export(3).unwrap_err(), ThumbError::Unknown);
}

#[test]
fn oversized_frames_are_rejected() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let source = ByteSource::open_file(SAMPLE_VIDEO).expect("Failed to open fixture");
    let options = SessionOptions::new().with_pixel_budget(1024);
    let result = MediaSession::open_with_options(source, options);
    assert_eq!(result.unwrap_err(), ThumbError::TooBig);
}

#[test]
fn errors_display_ffmpeg_messages() {
    assert_eq!(
        ThumbError::InvalidData.to_string(),
        "ffmpeg: invalid data found when processing input"
    );
    assert_eq!(ThumbError::from_code(ThumbError::TooBig.code()), ThumbError::TooBig);
}
