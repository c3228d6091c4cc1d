//! Fit quality of a plate solution.
//!
//! The brightest catalogue stars are projected into the frame with the solved
//! camera model. Around each predicted position an aperture is centroided on
//! the pixels standing out of the sky background; the distance between the
//! centroid and the prediction measures how well the model fits.
//!
//! The background level is the frame median and its noise is estimated from
//! the pixels below the median only, which stars cannot contaminate.
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::catalogs::HipparcosCatalogue;
use crate::constants::PixelDistance;
use crate::frames::Pixel;
use crate::projection::CameraModel;

/// Lower-half sigma clipping passes.
const SIGMA_CLIP_ITERATIONS: usize = 5;
const SIGMA_CLIP_FACTOR: f64 = 3.0;
/// Bright pixels stand this many sigma above the background.
const DETECTION_SIGMA: f64 = 3.0;

/// Mean offset between predicted and measured star positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub mean_offset: PixelDistance,
    /// Apertures that contained enough bright pixels
    pub count: usize,
}

/// Robust `(level, sigma)` of the sky background.
pub fn estimate_background(frame: &GrayImage) -> (f64, f64) {
    let mut values: Vec<f64> = frame.pixels().map(|p| p[0] as f64).collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = values.len();
    let median = if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    };

    let mut low_half: Vec<f64> = values.iter().copied().filter(|&v| v <= median).collect();
    let mut sigma = 0.0;
    for _ in 0..SIGMA_CLIP_ITERATIONS {
        if low_half.is_empty() {
            break;
        }
        // Deviations are mirrored about the median
        sigma = (low_half.iter().map(|v| (v - median).powi(2)).sum::<f64>()
            / low_half.len() as f64)
            .sqrt();
        if sigma < 1e-10 {
            break;
        }
        let before = low_half.len();
        low_half.retain(|&v| median - v <= SIGMA_CLIP_FACTOR * sigma);
        if low_half.len() == before {
            break;
        }
    }
    (median, sigma)
}

/// Intensity-weighted centroid of the bright pixels within `radius` of `centre`.
///
/// Return
/// ----------
/// * `None` when fewer than `min_bright` pixels exceed `threshold`.
pub fn aperture_centroid(
    frame: &GrayImage,
    centre: &Pixel,
    radius: PixelDistance,
    threshold: f64,
    min_bright: usize,
) -> Option<Pixel> {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let x_lo = ((centre.x - radius).floor() as i64).max(0);
    let x_hi = ((centre.x + radius).ceil() as i64).min(w - 1);
    let y_lo = ((centre.y - radius).floor() as i64).max(0);
    let y_hi = ((centre.y + radius).ceil() as i64).min(h - 1);

    let (mut sum, mut sum_x, mut sum_y, mut bright) = (0.0, 0.0, 0.0, 0usize);
    for y in y_lo..=y_hi {
        for x in x_lo..=x_hi {
            // Pixel (x, y) covers [x, x + 1), its centre is at x + 0.5
            let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
            if (px - centre.x).hypot(py - centre.y) > radius {
                continue;
            }
            let excess = frame.get_pixel(x as u32, y as u32)[0] as f64 - threshold;
            if excess > 0.0 {
                bright += 1;
                sum += excess;
                sum_x += excess * px;
                sum_y += excess * py;
            }
        }
    }
    (bright >= min_bright && sum > 0.0).then(|| Pixel::new(sum_x / sum, sum_y / sum))
}

/// Score a solved camera model against the frame it was solved from.
///
/// Arguments
/// -----------------
/// * `frame`: the frame as recorded, with lens distortion.
/// * `camera`: solved model of that frame, centre in J2000.
/// * `hipparcos`: bright star catalogue.
/// * `star_count`: number of brightest in-field stars tried.
/// * `aperture_radius`, `min_bright_pixels`: aperture acceptance.
///
/// Return
/// ----------
/// * `None` when no aperture qualifies.
pub fn fit_quality(
    frame: &GrayImage,
    camera: &CameraModel,
    hipparcos: &HipparcosCatalogue,
    star_count: usize,
    aperture_radius: PixelDistance,
    min_bright_pixels: usize,
) -> Option<FitQuality> {
    let (level, sigma) = estimate_background(frame);
    let threshold = level + (DETECTION_SIGMA * sigma).max(1.0);

    let offsets: Vec<f64> = hipparcos
        .brightest_in(camera, star_count)
        .into_iter()
        .filter_map(|(_, predicted)| {
            aperture_centroid(frame, &predicted, aperture_radius, threshold, min_bright_pixels)
                .map(|measured| measured.distance_to(&predicted))
        })
        .collect();
    if offsets.is_empty() {
        return None;
    }
    Some(FitQuality {
        mean_offset: offsets.iter().sum::<f64>() / offsets.len() as f64,
        count: offsets.len(),
    })
}
