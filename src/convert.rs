//! Conversion of raw device frames to RGB images.

use image::{ImageFormat, RgbImage};
use tracing::debug;

use crate::traits::{CameraError, FourCC, Frame, Result};

/// Whether [`to_rgb`] understands this pixel format.
#[must_use]
pub fn is_supported(fourcc: FourCC) -> bool {
    [FourCC::YUYV, FourCC::MJPG, FourCC::RGB3, FourCC::BGR3].contains(&fourcc)
}

/// Convert a raw frame into an RGB image in display order.
pub fn to_rgb(frame: &Frame) -> Result<RgbImage> {
    let format = &frame.format;
    match format.fourcc {
        FourCC::MJPG => {
            let decoded = image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)?;
            Ok(decoded.to_rgb8())
        }
        FourCC::YUYV => packed_to_rgb(frame, 2, yuyv_row),
        FourCC::RGB3 => packed_to_rgb(frame, 3, |src, dst| dst.copy_from_slice(src)),
        FourCC::BGR3 => packed_to_rgb(frame, 3, bgr_row),
        other => {
            debug!("No converter for {other}");
            Err(CameraError::FormatNotSupported(format.clone()))
        }
    }
}

/// Walk the frame row by row, honouring the driver's stride.
fn packed_to_rgb<F>(frame: &Frame, bytes_per_pixel: u32, row: F) -> Result<RgbImage>
where
    F: Fn(&[u8], &mut [u8]),
{
    let format = &frame.format;
    if format.width == 0 || format.height == 0 {
        return Err(CameraError::StreamError(format!(
            "empty frame geometry {}x{} {}",
            format.width, format.height, format.fourcc
        )));
    }

    let width = format.width as usize;
    let line = width * bytes_per_pixel as usize;
    let stride = (format.stride as usize).max(line);
    let height = format.height as usize;

    if stride == 0 || frame.data.len() < stride * (height.saturating_sub(1)) + line {
        return Err(CameraError::StreamError(format!(
            "short frame: {} bytes for {}x{} {}",
            frame.data.len(),
            format.width,
            format.height,
            format.fourcc
        )));
    }

    let mut rgb = vec![0u8; width * height * 3];
    for (src, dst) in frame
        .data
        .chunks(stride)
        .zip(rgb.chunks_exact_mut(width * 3))
    {
        let Some(src) = src.get(..line) else {
            break;
        };
        row(src, dst);
    }

    RgbImage::from_raw(format.width, format.height, rgb)
        .ok_or_else(|| CameraError::StreamError("RGB buffer size mismatch".to_owned()))
}

fn bgr_row(src: &[u8], dst: &mut [u8]) {
    for (bgr, out) in src.chunks_exact(3).zip(dst.chunks_exact_mut(3)) {
        if let ([b, g, r], [or, og, ob]) = (bgr, out) {
            *or = *r;
            *og = *g;
            *ob = *b;
        }
    }
}

/// YUYV format: [Y0 U Y1 V] repeats, each pair of pixels shares U and V.
fn yuyv_row(src: &[u8], dst: &mut [u8]) {
    for (yuyv, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(6)) {
        if let ([y0, u, y1, v], [r0, g0, b0, r1, g1, b1]) = (yuyv, out) {
            (*r0, *g0, *b0) = yuv_to_rgb(*y0, *u, *v);
            (*r1, *g1, *b1) = yuv_to_rgb(*y1, *u, *v);
        }
    }
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
///
/// # Arguments
///
/// * `y` - Luminance value (16-235 for studio range)
/// * `u` - Blue-difference chroma value (16-240)
/// * `v` - Red-difference chroma value (16-240)
///
/// # Returns
///
/// RGB tuple with values clamped to 0-255 range.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}
