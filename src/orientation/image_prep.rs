//! Rectify and crop a frame before plate solving.
//!
//! The solver assumes a rectilinear projection, so the lens distortion is
//! removed first: an output pixel at normalised radius `r` (in units of the
//! half frame width) samples the source at `r · m(r)`, where `m` is the
//! distortion multiplier. The central `crop × crop` region is then kept,
//! which discards the corners where the distortion model is least reliable.
use camino::Utf8Path;
use image::{GrayImage, ImageError, ImageReader, Luma};
use log::debug;

use crate::constants::Degree;
use crate::pigazing_errors::PiGazingError;
use crate::projection::RadialDistortion;

/// Bilinear sample of a greyscale image, zero outside the frame.
#[inline]
pub fn sample_bilinear(src: &GrayImage, x: f64, y: f64) -> f64 {
    let get = |x: i64, y: i64| -> f64 {
        if x < 0 || y < 0 || x >= src.width() as i64 || y >= src.height() as i64 {
            return 0.0;
        }
        src.get_pixel(x as u32, y as u32)[0] as f64
    };
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = get(x0, y0);
    let p10 = get(x0 + 1, y0);
    let p01 = get(x0, y0 + 1);
    let p11 = get(x0 + 1, y0 + 1);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Remove `distortion` from `src` and keep the central `crop` fraction of each axis.
///
/// Arguments
/// -----------------
/// * `src`: frame as recorded by the camera.
/// * `distortion`: lens model normalised at the horizontal field edge.
/// * `crop`: linear fraction of each axis kept, in `(0, 1]`.
///
/// Return
/// ----------
/// * A rectilinear greyscale image of `round(crop·width) × round(crop·height)` pixels.
pub fn rectify(src: &GrayImage, distortion: &RadialDistortion, crop: f64) -> GrayImage {
    let (width, height) = (src.width() as f64, src.height() as f64);
    let (cx, cy) = (width / 2.0, height / 2.0);
    let out_w = ((width * crop).round() as u32).max(1);
    let out_h = ((height * crop).round() as u32).max(1);
    let x_off = (width - out_w as f64) / 2.0;
    let y_off = (height - out_h as f64) / 2.0;

    GrayImage::from_fn(out_w, out_h, |i, j| {
        // Pixel centres
        let u = x_off + i as f64 + 0.5;
        let v = y_off + j as f64 + 0.5;
        let m = if distortion.is_zero() {
            1.0
        } else {
            distortion.multiplier((u - cx).hypot(v - cy) / cx)
        };
        let sx = cx + (u - cx) * m - 0.5;
        let sy = cy + (v - cy) * m - 0.5;
        Luma([sample_bilinear(src, sx, sy).round().clamp(0.0, 255.0) as u8])
    })
}

/// Decode an image file as 8-bit greyscale.
///
/// A missing or unreadable file is an [`PiGazingError::Image`], which only
/// skips the image.
pub fn load_frame(path: &Utf8Path) -> Result<GrayImage, PiGazingError> {
    let reader = ImageReader::open(path).map_err(ImageError::IoError)?;
    Ok(reader.decode()?.to_luma8())
}

/// Rectify `frame` and save it as PNG at `dest`, returning the saved dimensions.
pub fn prepare_frame(
    frame: &GrayImage,
    dest: &Utf8Path,
    distortion: &RadialDistortion,
    crop: f64,
) -> Result<(u32, u32), PiGazingError> {
    let prepared = rectify(frame, distortion, crop);
    debug!(
        "{dest}: {}x{} rectified to {}x{}",
        frame.width(),
        frame.height(),
        prepared.width(),
        prepared.height()
    );
    prepared.save_with_format(dest, image::ImageFormat::Png)?;
    Ok(prepared.dimensions())
}

/// Load a frame, rectify it and save it as PNG at `dest`.
pub fn prepare_for_solver(
    src: &Utf8Path,
    dest: &Utf8Path,
    distortion: &RadialDistortion,
    crop: f64,
) -> Result<(u32, u32), PiGazingError> {
    prepare_frame(&load_frame(src)?, dest, distortion, crop)
}

/// Field of view of the full frame from the field of view of its central crop.
///
/// `2·atan(tan(reported / 2) / crop)`
pub fn expand_field(reported: Degree, crop: f64) -> Degree {
    2.0 * ((reported.to_radians() / 2.0).tan() / crop).atan().to_degrees()
}

/// Field of view of the central crop of a frame, inverse of [`expand_field`].
pub fn crop_field(full: Degree, crop: f64) -> Degree {
    2.0 * ((full.to_radians() / 2.0).tan() * crop).atan().to_degrees()
}
