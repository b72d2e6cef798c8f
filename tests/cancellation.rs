//! Cancellation integration tests.

use std::{
    io::{Read, Repeat, repeat},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};

use thumbframe::{
    ByteSource, CancellationToken, MediaSession, OperationType, ProgressCallback, ProgressInfo,
    SessionOptions, ThumbError,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

/// Fires the token once `after` frames have been scanned.
struct CancelAfter {
    token: CancellationToken,
    after: u64,
    reports: AtomicU64,
}

impl ProgressCallback for CancelAfter {
    fn on_progress(&self, info: &ProgressInfo) {
        assert_eq!(info.operation, OperationType::FrameScan);
        self.reports.fetch_add(1, Ordering::Relaxed);
        if info.current >= self.after {
            self.token.cancel();
        }
    }
}

#[test]
fn cancelled_before_open() {
    let token = CancellationToken::new();
    token.cancel();

    let endless = repeat(0).take(u64::MAX);
    let options = SessionOptions::new().with_cancellation(token);
    let result = MediaSession::open_with_options(ByteSource::from_reader(endless, None), options);
    assert_eq!(result.unwrap_err(), ThumbError::Unknown);
}

/// An endless stream of zeros that stalls on every read and hands back at
/// most 512 bytes at a time.
struct SlowZeros {
    inner: Repeat,
    delay: Duration,
}

impl Read for SlowZeros {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        thread::sleep(self.delay);
        let length = buffer.len().min(512);
        self.inner.read(&mut buffer[..length])
    }
}

#[test]
fn cancelled_while_reading_a_slow_source() {
    let token = CancellationToken::new();
    let options = SessionOptions::new().with_cancellation(token.clone());
    let source = ByteSource::from_reader(
        SlowZeros {
            inner: repeat(0),
            delay: Duration::from_millis(20),
        },
        None,
    );

    let (sender, receiver) = mpsc::channel();
    let opener = thread::spawn(move || {
        let result = MediaSession::open_with_options(source, options).map(drop);
        let _ = sender.send(result);
    });

    thread::sleep(Duration::from_millis(100));
    assert!(
        receiver.try_recv().is_err(),
        "open finished before the token fired"
    );
    let cancelled_at = Instant::now();
    token.cancel();

    let result = receiver
        .recv_timeout(Duration::from_secs(5))
        .expect("open did not return after cancellation");
    assert_eq!(result.unwrap_err(), ThumbError::Unknown);
    assert!(cancelled_at.elapsed() < Duration::from_secs(5));
    opener.join().expect("opener thread panicked");
}

#[test]
fn cancelled_during_selection() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let token = CancellationToken::new();
    let callback = Arc::new(CancelAfter {
        token: token.clone(),
        after: 5,
        reports: AtomicU64::new(0),
    });
    let options = SessionOptions::new()
        .with_cancellation(token.clone())
        .with_progress(callback.clone())
        .with_batch_size(1);

    let source = ByteSource::open_file(SAMPLE_VIDEO).expect("Failed to open fixture");
    let mut session = MediaSession::open_with_options(source, options).expect("Failed to open session");

    assert_eq!(session.select_best().unwrap_err(), ThumbError::Unknown);
    assert!(token.is_cancelled());
    let reports = callback.reports.load(Ordering::Relaxed);
    assert!((5..20).contains(&reports), "scan kept going: {reports} reports");

    // The session stays unusable but metadata is intact.
    assert!(session.metadata().has_video);
    assert_eq!(session.select_frame(1).unwrap_err(), ThumbError::Unknown);
    assert!(session.selected().is_none());
}

#[test]
fn progress_reports_scanned_frames() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let token = CancellationToken::new();
    let callback = Arc::new(CancelAfter {
        token,
        after: u64::MAX,
        reports: AtomicU64::new(0),
    });
    let options = SessionOptions::new()
        .with_progress(callback.clone())
        .with_batch_size(10);

    let source = ByteSource::open_file(SAMPLE_VIDEO).expect("Failed to open fixture");
    let mut session = MediaSession::open_with_options(source, options).expect("Failed to open session");
    session.select_frame(30).expect("Failed to select");

    // Three batches of ten plus the final report.
    assert_eq!(callback.reports.load(Ordering::Relaxed), 4);
}
