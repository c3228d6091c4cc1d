//! Least-squares fit of a lens model to identified stars.
//!
//! Parameters are shared by every image (pixel aspect ratio and the radial
//! distortion coefficients) or belong to one image (field centre, horizontal
//! field of view and position angle). The objective is the sum over all stars
//! of the squared offset between the measured pixel and the projection of the
//! catalogue position, in units of the image width.
//!
//! The fit runs in two stages:
//!
//! 1. each image alone, square pixels and no distortion, from several
//!    position-angle seeds, keeping the best,
//! 2. every parameter jointly, seeded from stage one.
//!
//! Parameter vector layout: `[aspect, k1, (k2, k3), then per image ra°, dec°, scale_x°, pa°]`.
use log::{debug, info};

use crate::config::CalibrationConfig;
use crate::constants::{wrap_24, wrap_360, Degree, Hour, PixelDistance};
use crate::frames::{EquatorialJ2000, Pixel};
use crate::optimize::NelderMead;
use crate::pigazing_errors::PiGazingError;
use crate::projection::{vertical_scale, CameraModel, Projected, RadialDistortion};
use crate::sky::ang_dist;

/// A measured star and its catalogue position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarMatch {
    pub hip: u32,
    pub pixel: Pixel,
    pub position: EquatorialJ2000,
}

/// The identified stars of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStars {
    pub name: String,
    pub size_x: f64,
    pub size_y: f64,
    pub stars: Vec<StarMatch>,
    /// Nominal horizontal field of view, when the lens is known
    pub scale_hint: Option<Degree>,
}

/// Fitted pointing of one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePointing {
    pub ra0: Hour,
    pub dec0: Degree,
    pub scale_x: Degree,
    pub pos_ang: Degree,
}

/// Outcome of a lens fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LensFit {
    pub aspect: f64,
    pub distortion: RadialDistortion,
    pub pointings: Vec<ImagePointing>,
    /// Root mean square offset between measured and modelled stars
    pub rms_offset: PixelDistance,
    /// Final objective value
    pub objective: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl LensFit {
    /// Camera model of image `index` under this fit.
    pub fn camera(&self, image: &ImageStars, index: usize) -> Option<CameraModel> {
        let p = self.pointings.get(index)?;
        Some(camera_model(image, p, self.aspect, self.distortion))
    }
}

fn camera_model(
    image: &ImageStars,
    pointing: &ImagePointing,
    aspect: f64,
    distortion: RadialDistortion,
) -> CameraModel {
    CameraModel {
        ra0: pointing.ra0,
        dec0: pointing.dec0,
        size_x: image.size_x,
        size_y: image.size_y,
        scale_x: pointing.scale_x,
        scale_y: vertical_scale(pointing.scale_x, image.size_x, image.size_y, aspect),
        pos_ang: pointing.pos_ang,
        distortion,
    }
}

/// Squared offsets of one image, in image widths, or `NaN` when a star falls out of field.
fn image_cost(image: &ImageStars, camera: &CameraModel) -> f64 {
    if !(camera.scale_x > 0.0 && camera.scale_x < 180.0) || camera.dec0.abs() > 90.0 {
        return f64::NAN;
    }
    let mut sum = 0.0;
    for star in &image.stars {
        match camera.project(star.position.ra, star.position.dec) {
            Projected::InField(p) => {
                let dx = (p.x - star.pixel.x) / image.size_x;
                let dy = (p.y - star.pixel.y) / image.size_x;
                sum += dx * dx + dy * dy;
            }
            Projected::OutOfField => return f64::NAN,
        }
    }
    sum
}

fn pointing_from(params: &[f64]) -> ImagePointing {
    ImagePointing {
        ra0: params[0] / 15.0,
        dec0: params[1],
        scale_x: params[2],
        pos_ang: params[3],
    }
}

/// Horizontal field of view guessed from the most separated pair of stars.
fn guess_scale(image: &ImageStars) -> Option<Degree> {
    let mut best: Option<(f64, f64)> = None;
    for (i, a) in image.stars.iter().enumerate() {
        for b in &image.stars[i + 1..] {
            let pixels = a.pixel.distance_to(&b.pixel);
            if best.map_or(true, |(d, _)| pixels > d) {
                let angle = ang_dist(a.position.ra, a.position.dec, b.position.ra, b.position.dec)
                    .to_degrees();
                best = Some((pixels, angle));
            }
        }
    }
    best.filter(|(pixels, _)| *pixels > 0.0)
        .map(|(pixels, angle)| angle / pixels * image.size_x)
}

/// Lens model fitter.
#[derive(Debug, Clone)]
pub struct LensCalibrator<'a> {
    config: &'a CalibrationConfig,
    /// Fit `k2` and `k3` as well as `k1`
    all_coefficients: bool,
}

impl<'a> LensCalibrator<'a> {
    pub fn new(config: &'a CalibrationConfig) -> Self {
        LensCalibrator {
            config,
            all_coefficients: true,
        }
    }

    /// Restrict the distortion to `k1` when `false`.
    pub fn all_coefficients(mut self, all: bool) -> Self {
        self.all_coefficients = all;
        self
    }

    fn n_coefficients(&self) -> usize {
        if self.all_coefficients {
            3
        } else {
            1
        }
    }

    fn minimizer(&self, steps: Vec<f64>) -> NelderMead {
        NelderMead::new(steps)
            .with_xatol(1e-9)
            .with_fatol(1e-16)
            .with_max_iterations(self.config.max_iterations)
    }

    /// Fit every image jointly.
    ///
    /// Arguments
    /// -----------------
    /// * `images`: identified stars per image; all images share the lens.
    ///
    /// Return
    /// ----------
    /// * The fitted [`LensFit`], or [`PiGazingError::PreconditionUnmet`] when an image has
    ///   fewer than two stars or the stars cannot constrain every parameter.
    pub fn fit(&self, images: &[ImageStars]) -> Result<LensFit, PiGazingError> {
        if images.is_empty() {
            return Err(PiGazingError::PreconditionUnmet(
                "no image to calibrate".into(),
            ));
        }
        if let Some(image) = images.iter().find(|i| i.stars.len() < 2) {
            return Err(PiGazingError::PreconditionUnmet(format!(
                "{}: {} identified star(s), need 2",
                image.name,
                image.stars.len()
            )));
        }
        let n_k = self.n_coefficients();
        let n_params = 1 + n_k + 4 * images.len();
        let n_constraints: usize = images.iter().map(|i| 2 * i.stars.len()).sum();
        if n_constraints < n_params {
            return Err(PiGazingError::PreconditionUnmet(format!(
                "{n_constraints} constraints for {n_params} parameters"
            )));
        }

        // Stage one
        let mut x0 = vec![1.0];
        x0.extend(std::iter::repeat(0.0).take(n_k));
        for image in images {
            let pointing = self.fit_image_geometry(image);
            debug!(
                "{}: seed ra = {:.4} h, dec = {:.3}°, scale = {:.3}°, pa = {:.2}°",
                image.name, pointing.ra0, pointing.dec0, pointing.scale_x, pointing.pos_ang
            );
            x0.extend([
                pointing.ra0 * 15.0,
                pointing.dec0,
                pointing.scale_x,
                pointing.pos_ang,
            ]);
        }

        // Stage two
        let mut steps = vec![self.config.step_aspect];
        steps.extend(std::iter::repeat(self.config.step_distortion).take(n_k));
        for _ in images {
            steps.extend([
                self.config.step_position,
                self.config.step_position,
                self.config.step_scale,
                self.config.step_pos_ang,
            ]);
        }
        let unpack = |x: &[f64]| -> (f64, RadialDistortion, Vec<ImagePointing>) {
            let k = |i: usize| if i < n_k { x[1 + i] } else { 0.0 };
            let pointings = x[1 + n_k..].chunks_exact(4).map(pointing_from).collect();
            (x[0], RadialDistortion::new(k(0), k(1), k(2)), pointings)
        };
        let objective = |x: &[f64]| {
            let (aspect, distortion, pointings) = unpack(x);
            if aspect <= 0.0 {
                return f64::NAN;
            }
            images
                .iter()
                .zip(&pointings)
                .map(|(image, p)| image_cost(image, &camera_model(image, p, aspect, distortion)))
                .sum()
        };
        let minimum = self.minimizer(steps).minimize(objective, &x0);
        let (aspect, distortion, pointings) = unpack(&minimum.x);
        let pointings: Vec<ImagePointing> = pointings
            .into_iter()
            .map(|p| ImagePointing {
                ra0: wrap_24(p.ra0),
                pos_ang: wrap_360(p.pos_ang),
                ..p
            })
            .collect();

        let mut fit = LensFit {
            aspect,
            distortion,
            pointings,
            rms_offset: f64::NAN,
            objective: minimum.value,
            iterations: minimum.iterations,
            converged: minimum.converged,
        };
        fit.rms_offset = rms_offset(&fit, images);
        info!(
            "lens fit over {} image(s): k = ({:.5}, {:.5}, {:.5}), aspect = {:.4}, rms = {:.3} px",
            images.len(),
            distortion.k1,
            distortion.k2,
            distortion.k3,
            aspect,
            fit.rms_offset
        );
        Ok(fit)
    }

    /// Stage one: pointing of a single image with an ideal lens.
    fn fit_image_geometry(&self, image: &ImageStars) -> ImagePointing {
        let first = image.stars[0].position;
        let scale = image
            .scale_hint
            .or_else(|| guess_scale(image))
            .unwrap_or(60.0)
            .clamp(1.0, 170.0);
        let steps = vec![
            self.config.step_position,
            self.config.step_position,
            self.config.step_scale,
            self.config.step_pos_ang,
        ];
        let objective = |x: &[f64]| {
            let camera = camera_model(image, &pointing_from(x), 1.0, RadialDistortion::NONE);
            image_cost(image, &camera)
        };
        let nm = self.minimizer(steps);
        self.config
            .pos_ang_seeds
            .iter()
            .map(|pa| nm.minimize(objective, &[first.ra * 15.0, first.dec, scale, *pa]))
            .min_by(|a, b| a.value.total_cmp(&b.value))
            .map(|m| pointing_from(&m.x))
            .unwrap_or(ImagePointing {
                ra0: first.ra,
                dec0: first.dec,
                scale_x: scale,
                pos_ang: 0.0,
            })
    }
}

/// Root mean square pixel offset of every star under `fit`.
pub fn rms_offset(fit: &LensFit, images: &[ImageStars]) -> PixelDistance {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (index, image) in images.iter().enumerate() {
        let Some(camera) = fit.camera(image, index) else {
            continue;
        };
        for star in &image.stars {
            if let Some(p) = camera
                .project(star.position.ra, star.position.dec)
                .pixel()
            {
                sum += p.distance_to(&star.pixel).powi(2);
                n += 1;
            }
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        (sum / n as f64).sqrt()
    }
}
