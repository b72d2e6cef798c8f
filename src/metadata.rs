//! Media metadata types.
//!
//! [`Metadata`] is captured when a [`MediaSession`](crate::MediaSession)
//! opens. Duration and frame rate are refined from decoded timestamps when
//! the container did not declare them.

use std::time::Duration;

use serde::{Serialize, Serializer};

/// Container rotation hint, as an EXIF-style orientation code.
///
/// The session only reports it; applying the rotation is up to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u8")]
pub enum Orientation {
    /// No rotation (code 0).
    #[default]
    Normal,
    /// Upside down (code 3).
    Rotate180,
    /// Display matrix rotates 90° clockwise (code 6).
    Rotate90,
    /// Display matrix rotates 270° clockwise (code 8).
    Rotate270,
}

impl Orientation {
    /// Classify a display-matrix rotation, in degrees counter-clockwise as
    /// returned by `av_display_rotation_get`, to the nearest quarter turn.
    pub fn from_display_rotation(rotation: f64) -> Self {
        if !rotation.is_finite() {
            return Orientation::Normal;
        }
        let mut theta = -rotation;
        theta -= 360.0 * (theta / 360.0 + 0.9 / 360.0).floor();
        match (90.0 * (theta / 90.0).round()) as i64 % 360 {
            90 => Orientation::Rotate90,
            180 => Orientation::Rotate180,
            270 => Orientation::Rotate270,
            _ => Orientation::Normal,
        }
    }

    /// The orientation code: 0, 3, 6 or 8.
    pub fn code(self) -> u8 {
        match self {
            Orientation::Normal => 0,
            Orientation::Rotate180 => 3,
            Orientation::Rotate90 => 6,
            Orientation::Rotate270 => 8,
        }
    }

    /// Degrees counter-clockwise the host should rotate the exported
    /// frame by to display it upright.
    pub fn rotation_degrees(self) -> u16 {
        match self {
            Orientation::Normal => 0,
            Orientation::Rotate180 => 180,
            Orientation::Rotate90 => 270,
            Orientation::Rotate270 => 90,
        }
    }
}

impl From<Orientation> for u8 {
    fn from(orientation: Orientation) -> Self {
        orientation.code()
    }
}

/// A snapshot of what a session knows about its input.
///
/// Serialises to the JSON shape hosts return for metadata requests:
/// zero dimensions, zero duration, empty tags and an unknown frame rate are
/// omitted.
///
/// # Example
///
/// ```no_run
/// use thumbframe::{ByteSource, MediaSession, ThumbError};
///
/// let session = MediaSession::open(ByteSource::open_file("input.mp4")?)?;
/// let metadata = session.metadata();
/// println!("{}x{} for {:?}", metadata.width, metadata.height, metadata.duration);
/// # Ok::<(), ThumbError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[must_use]
pub struct Metadata {
    /// Rotation hint from the video stream's display matrix.
    pub orientation: Orientation,
    /// Total duration. Serialised in whole milliseconds.
    #[serde(
        serialize_with = "serialize_millis",
        skip_serializing_if = "Duration::is_zero"
    )]
    pub duration: Duration,
    /// Frame width in pixels.
    #[serde(skip_serializing_if = "is_zero")]
    pub width: u32,
    /// Frame height in pixels.
    #[serde(skip_serializing_if = "is_zero")]
    pub height: u32,
    /// Container `title` tag.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Container `artist` tag.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub artist: String,
    /// Average frame rate, when it can be determined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Whether a video stream (or cover art) is present.
    pub has_video: bool,
    /// Whether an audio stream is present.
    pub has_audio: bool,
    /// Whether the decoded pixel format carries an alpha channel.
    pub has_alpha: bool,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_rotation_maps_to_codes() {
        assert_eq!(Orientation::from_display_rotation(0.0), Orientation::Normal);
        assert_eq!(Orientation::from_display_rotation(-90.0), Orientation::Rotate90);
        assert_eq!(Orientation::from_display_rotation(90.0), Orientation::Rotate270);
        assert_eq!(Orientation::from_display_rotation(180.0), Orientation::Rotate180);
        assert_eq!(Orientation::from_display_rotation(-180.0), Orientation::Rotate180);
        assert_eq!(Orientation::from_display_rotation(-88.0), Orientation::Rotate90);
        assert_eq!(Orientation::from_display_rotation(f64::NAN), Orientation::Normal);
    }

    #[test]
    fn codes_and_host_rotation() {
        assert_eq!(Orientation::Normal.code(), 0);
        assert_eq!(Orientation::Rotate180.rotation_degrees(), 180);
        assert_eq!(Orientation::Rotate90.code(), 6);
        assert_eq!(Orientation::Rotate90.rotation_degrees(), 270);
        assert_eq!(Orientation::Rotate270.code(), 8);
        assert_eq!(Orientation::Rotate270.rotation_degrees(), 90);
    }

    #[test]
    fn json_omits_unknown_fields() {
        let metadata = Metadata {
            has_audio: true,
            ..Metadata::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "orientation": 0,
                "has_video": false,
                "has_audio": true,
                "has_alpha": false,
            })
        );
    }

    #[test]
    fn json_carries_known_fields() {
        let metadata = Metadata {
            orientation: Orientation::Rotate90,
            duration: Duration::from_millis(2_500),
            width: 640,
            height: 360,
            title: "Sample".into(),
            fps: Some(25.0),
            has_video: true,
            ..Metadata::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["orientation"], 6);
        assert_eq!(json["duration"], 2_500);
        assert_eq!(json["width"], 640);
        assert_eq!(json["title"], "Sample");
        assert!(json.get("artist").is_none());
        assert_eq!(json["fps"], 25.0);
    }
}
