//! Async thumbnailing (feature `async`).
//!
//! [`thumbnail_async`] runs a whole open → select → export → close cycle
//! on a Tokio blocking thread so FFmpeg's CPU-bound work never stalls the
//! runtime. Cancellation still goes through the token in
//! [`SessionOptions`]; dropping the future does not stop the decode.
//!
//! # Example
//!
//! ```no_run
//! use thumbframe::{ByteSource, SelectionRequest, SessionOptions, ThumbError, thumbnail_async};
//!
//! # async fn example() -> Result<(), ThumbError> {
//! let source = ByteSource::open_file("input.mp4")?;
//! let (metadata, frame) =
//!     thumbnail_async(source, SessionOptions::new(), SelectionRequest::Best, 3).await?;
//! println!("{}x{} from {:?}", frame.width(), frame.height(), metadata.duration);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::{
    config::SessionOptions,
    error::ThumbError,
    export::ExportedFrame,
    metadata::Metadata,
    selector::SelectionRequest,
    session::MediaSession,
    source::ByteSource,
};

/// A future resolving to the metadata and exported frame of one source.
///
/// If the blocking task panics or the runtime shuts down first, the future
/// resolves to [`ThumbError::Unknown`].
pub struct ThumbnailFuture {
    handle: JoinHandle<Result<(Metadata, ExportedFrame), ThumbError>>,
}

impl Future for ThumbnailFuture {
    type Output = Result<(Metadata, ExportedFrame), ThumbError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(ThumbError::Unknown)))
    }
}

/// Thumbnail `source` on a blocking thread.
///
/// Must be called from within a Tokio runtime.
pub fn thumbnail_async(
    source: ByteSource,
    options: SessionOptions,
    request: SelectionRequest,
    bands: u8,
) -> ThumbnailFuture {
    let handle = tokio::task::spawn_blocking(move || {
        let mut session = MediaSession::open_with_options(source, options)?;
        session.select(request)?;
        let frame = session.export(bands)?;
        let metadata = session.metadata().clone();
        session.close();
        Ok((metadata, frame))
    });
    ThumbnailFuture { handle }
}
