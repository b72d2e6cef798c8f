//! Async thumbnailing tests (feature `async`).

#![cfg(feature = "async")]

use std::path::Path;

use thumbframe::{
    ByteSource, CancellationToken, SelectionRequest, SessionOptions, ThumbError, thumbnail_async,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

#[tokio::test]
async fn thumbnail_on_blocking_thread() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let source = ByteSource::open_file(SAMPLE_VIDEO).expect("Failed to open fixture");
    let (metadata, frame) = thumbnail_async(source, SessionOptions::new(), SelectionRequest::Best, 4)
        .await
        .expect("Failed to thumbnail");

    assert!(metadata.has_video);
    assert_eq!(frame.bands(), 4);
    assert_eq!(frame.data().len(), (metadata.width * metadata.height * 4) as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_thumbnails_agree() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let futures: Vec<_> = (0..4)
        .map(|_| {
            let source = ByteSource::open_file(SAMPLE_VIDEO).expect("Failed to open fixture");
            thumbnail_async(source, SessionOptions::new(), SelectionRequest::Position(0.5), 3)
        })
        .collect();

    let mut frames = Vec::new();
    for future in futures {
        let (_, frame) = future.await.expect("Failed to thumbnail");
        frames.push(frame);
    }
    assert!(frames.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn cancelled_token_fails() {
    let token = CancellationToken::new();
    token.cancel();

    let options = SessionOptions::new().with_cancellation(token);
    let result = thumbnail_async(
        ByteSource::from_bytes(vec![0u8; 1024]),
        options,
        SelectionRequest::Best,
        3,
    )
    .await;
    assert_eq!(result.unwrap_err(), ThumbError::Unknown);
}
