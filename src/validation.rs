//! Checks for captured output.
//!
//! Used by the unit tests and by the virtual-camera integration suite to
//! confirm that converted frames carry the expected test pattern and that a
//! session's records are numbered without gaps.

use image::RgbImage;

use crate::traits::{CameraError, Result};
use crate::writer::FrameRecord;

/// Expected RGB values for the 8 SMPTE color bars after YUV → RGB conversion.
///
/// White, Yellow, Cyan, Green, Magenta, Red, Blue, Black.
const SMPTE_COLOR_BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 11],
    [12, 236, 237],
    [13, 237, 13],
    [237, 13, 237],
    [238, 14, 13],
    [15, 15, 239],
    [16, 16, 16],
];

/// Per-channel tolerance for conversion rounding.
const COLOR_TOLERANCE: u8 = 15;

/// Check that `image` shows the 8 color bars, sampling the middle of each.
pub fn validate_color_bars(image: &RgbImage) -> Result<()> {
    let (width, height) = image.dimensions();
    let bar_width = width / 8;
    let center_y = height / 2;

    for (bar, expected) in (0u32..).zip(SMPTE_COLOR_BARS.iter()) {
        let x = bar * bar_width + bar_width / 2;
        let actual = pixel(image, x, center_y)?;
        if !colors_match(actual, *expected, COLOR_TOLERANCE) {
            return Err(CameraError::StreamError(format!(
                "color bar {bar} mismatch at ({x}, {center_y}): expected {expected:?}, got {actual:?}"
            )));
        }
    }

    Ok(())
}

/// Check that luminance across the middle row rises left to right and spans
/// a meaningful range.
pub fn validate_gradient(image: &RgbImage) -> Result<()> {
    const SAMPLE_STEP: usize = 10;
    const MIN_SPAN: f32 = 100.0;
    const JITTER: f32 = 2.0;

    let (width, height) = image.dimensions();
    let center_y = height / 2;

    let mut samples = Vec::new();
    for x in (0..width).step_by(SAMPLE_STEP) {
        samples.push((x, luminance(pixel(image, x, center_y)?)));
    }

    for pair in samples.windows(2) {
        if let [(_, prev), (x, current)] = pair {
            if *current + JITTER < *prev {
                return Err(CameraError::StreamError(format!(
                    "gradient not increasing at x={x}: {prev:.1} → {current:.1}"
                )));
            }
        }
    }

    let span = match (samples.first(), samples.last()) {
        (Some((_, first)), Some((_, last))) => last - first,
        _ => 0.0,
    };
    if span < MIN_SPAN {
        return Err(CameraError::StreamError(format!(
            "luminance only changes by {span:.1} across the frame"
        )));
    }

    Ok(())
}

/// Check that `records` are numbered consecutively.
pub fn validate_record_sequence(records: &[FrameRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(CameraError::StreamError("no frames recorded".to_owned()));
    }

    for pair in records.windows(2) {
        if let [prev, current] = pair {
            if current.sequence != prev.sequence + 1 {
                return Err(CameraError::StreamError(format!(
                    "sequence gap: {} followed by {}",
                    prev.sequence, current.sequence
                )));
            }
        }
    }

    Ok(())
}

fn pixel(image: &RgbImage, x: u32, y: u32) -> Result<[u8; 3]> {
    image
        .get_pixel_checked(x, y)
        .map(|p| p.0)
        .ok_or_else(|| CameraError::StreamError(format!("pixel ({x}, {y}) out of bounds")))
}

fn luminance([r, g, b]: [u8; 3]) -> f32 {
    0.299f32.mul_add(
        f32::from(r),
        0.587f32.mul_add(f32::from(g), 0.114 * f32::from(b)),
    )
}

fn colors_match(actual: [u8; 3], expected: [u8; 3], tolerance: u8) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| a.abs_diff(*e) <= tolerance)
}
