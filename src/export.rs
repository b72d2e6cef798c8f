//! Packed RGB/RGBA export of the selected frame.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use ffmpeg_next::{
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage, RgbaImage};

use crate::{conversion::frame_to_buffer, error::ThumbError};

/// A frame converted to 8-bit packed pixels.
///
/// `data` is row-major and channel-interleaved with no row padding, so its
/// length is always `width * height * bands`.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    bands: u8,
}

impl Debug for ExportedFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExportedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bands", &self.bands)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl ExportedFrame {
    /// The packed pixel bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take ownership of the pixel bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Channels per pixel: 3 (RGB) or 4 (RGBA).
    pub fn bands(&self) -> u8 {
        self.bands
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * usize::from(self.bands)
    }

    /// Hand the buffer to the `image` crate for encoding or resizing.
    ///
    /// # Errors
    ///
    /// Returns [`ThumbError::InvalidData`] if the buffer does not match its
    /// dimensions, which cannot happen for frames produced by a session.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use thumbframe::{ByteSource, MediaSession};
    ///
    /// let mut session = MediaSession::open(ByteSource::open_file("input.mp4")?)?;
    /// let frame = session.thumbnail(3)?;
    /// frame.to_image()?.save("thumb.png")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn to_image(&self) -> Result<DynamicImage, ThumbError> {
        self.clone().into_image()
    }

    /// Like [`to_image`](ExportedFrame::to_image) without copying the bytes.
    ///
    /// # Errors
    ///
    /// See [`to_image`](ExportedFrame::to_image).
    pub fn into_image(self) -> Result<DynamicImage, ThumbError> {
        let image = match self.bands {
            4 => RgbaImage::from_raw(self.width, self.height, self.data).map(DynamicImage::ImageRgba8),
            _ => RgbImage::from_raw(self.width, self.height, self.data).map(DynamicImage::ImageRgb8),
        };
        image.ok_or(ThumbError::InvalidData)
    }
}

/// 4 stays 4, anything else becomes 3.
pub(crate) fn normalize_bands(bands: u8) -> u8 {
    if bands == 4 { 4 } else { 3 }
}

/// Convert a decoded frame to packed RGB24 or RGBA at its own size.
pub(crate) fn export_frame(frame: &VideoFrame, bands: u8) -> Result<ExportedFrame, ThumbError> {
    let bands = normalize_bands(bands);
    let target = if bands == 4 { Pixel::RGBA } else { Pixel::RGB24 };
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(ThumbError::InvalidData);
    }

    let mut scaler = ScalingContext::get(
        frame.format(),
        width,
        height,
        target,
        width,
        height,
        ScalingFlags::LANCZOS | ScalingFlags::ACCURATE_RND,
    )?;
    let mut converted = VideoFrame::empty();
    scaler.run(frame, &mut converted)?;

    let data = frame_to_buffer(&converted, width, height, usize::from(bands));
    log::debug!("Exported {width}x{height} frame with {bands} bands");
    Ok(ExportedFrame {
        data,
        width,
        height,
        bands,
    })
}
