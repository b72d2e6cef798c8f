//! Pixel and timestamp helpers shared by the cursor, selector and exporter.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// FFmpeg's "no timestamp" sentinel.
pub(crate) const NO_PTS: i64 = i64::MIN;

/// Copy plane 0 of a packed frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is 3 for RGB24 and 4 for RGBA. Row padding introduced
/// by FFmpeg's stride alignment is dropped.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = (width as usize) * bytes_per_pixel;
    let rows = height as usize;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * rows].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_length * rows);
        for row in data.chunks(stride).take(rows) {
            buffer.extend_from_slice(&row[..row_length]);
        }
        buffer
    }
}

/// Convert a rational to `f64`, returning `None` for `0/x` and `x/0`.
pub(crate) fn rational_to_f64(rational: Rational) -> Option<f64> {
    if rational.numerator() == 0 || rational.denominator() == 0 {
        return None;
    }
    Some(f64::from(rational.numerator()) / f64::from(rational.denominator()))
}

/// Rescale a stream PTS to a presentation time relative to the stream start.
///
/// An unset start time counts as zero. Timestamps before the start clamp to
/// zero and timestamps too large for a [`Duration`] saturate.
pub(crate) fn pts_to_duration(pts: i64, start_time: i64, time_base: Rational) -> Duration {
    let start = if start_time == NO_PTS { 0 } else { start_time };
    let seconds = pts.saturating_sub(start) as f64 * f64::from(time_base.numerator())
        / f64::from(time_base.denominator().max(1));
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Convert a [`Duration`] to AV_TIME_BASE (microseconds), the unit
/// `Input::seek` expects.
pub(crate) fn duration_to_seek_timestamp(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

/// Convert a presentation time to a 1-based frame index using the frame
/// rate. Saturates at `u64::MAX`.
pub(crate) fn timestamp_to_frame_number(timestamp: Duration, frames_per_second: f64) -> u64 {
    ((timestamp.as_secs_f64() * frames_per_second).round() as u64).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_honours_start_time_and_time_base() {
        let time_base = Rational::new(1, 90_000);
        assert_eq!(
            pts_to_duration(180_000, 0, time_base),
            Duration::from_secs(2)
        );
        assert_eq!(
            pts_to_duration(270_000, 90_000, time_base),
            Duration::from_secs(2)
        );
        assert_eq!(
            pts_to_duration(45_000, NO_PTS, time_base),
            Duration::from_millis(500)
        );
        assert_eq!(pts_to_duration(10, 90_000, time_base), Duration::ZERO);
    }

    #[test]
    fn degenerate_rationals_have_no_value() {
        assert_eq!(rational_to_f64(Rational::new(0, 1)), None);
        assert_eq!(rational_to_f64(Rational::new(25, 0)), None);
        assert_eq!(rational_to_f64(Rational::new(30_000, 1001)), Some(30_000.0 / 1001.0));
    }

    #[test]
    fn frame_numbers_are_one_based() {
        assert_eq!(timestamp_to_frame_number(Duration::ZERO, 25.0), 1);
        assert_eq!(timestamp_to_frame_number(Duration::from_secs(2), 25.0), 51);
    }

    #[test]
    fn extreme_timestamps_saturate() {
        assert_eq!(
            pts_to_duration(i64::MAX / 2, 0, Rational::new(4, 1)),
            Duration::MAX
        );
        assert_eq!(
            pts_to_duration(i64::MAX, i64::MIN + 1, Rational::new(i32::MAX, 1)),
            Duration::MAX
        );
        assert_eq!(pts_to_duration(i64::MIN + 1, i64::MAX, Rational::new(1, 1)), Duration::ZERO);
        assert_eq!(timestamp_to_frame_number(Duration::MAX, 30.0), u64::MAX);
        assert_eq!(timestamp_to_frame_number(Duration::MAX, f64::INFINITY), u64::MAX);
        assert_eq!(timestamp_to_frame_number(Duration::from_secs(1), f64::NAN), 1);
    }

    #[test]
    fn seek_timestamps_are_microseconds() {
        assert_eq!(
            duration_to_seek_timestamp(Duration::from_millis(1500)),
            1_500_000
        );
    }
}
