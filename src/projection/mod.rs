//! # Gnomonic projection with radial distortion
//!
//! Forward and inverse mapping between sky positions and pixels of a camera
//! described by a [`CameraModel`].
//!
//! ## Pipeline (forward)
//!
//! 1. Rotate the sky so that the field centre `(ra0, dec0)` lies on the `+x` axis.
//! 2. Gnomonic projection onto the tangent plane: `ξ = y/x` (east), `η = z/x` (north).
//!    Points at or beyond 90° from the centre are [`Projected::OutOfField`].
//! 3. Rotate by the position angle of image-up so that `(left, up)` are image axes.
//! 4. Normalise by `tan(scale_x / 2)` and apply [`RadialDistortion`]. Radii past
//!    [`RadialDistortion::turning_radius`] are out of field too.
//! 5. Convert to pixels with independent horizontal and vertical scales.
//!
//! The inverse undoes each step; the distortion is inverted by bracketed Newton iteration
//! (see [`RadialDistortion::undistort_radius`]).
//!
//! ## Units
//!
//! The public API takes RA in **hours** and every other angle in **degrees**;
//! conversion to radians happens once, at the boundary.
//!
//! ## Position angle
//!
//! `pos_ang` is the position angle of the image-up direction at the field
//! centre, measured from celestial north through east. With `pos_ang = 0` north
//! is up and east is to the left, as on the sky seen from the ground.
pub mod distortion;

use serde::{Deserialize, Serialize};

use crate::constants::{wrap_24, Degree, Hour, RADH};
use crate::frames::{Pixel, TangentPlane};

pub use distortion::RadialDistortion;

/// Outcome of a forward projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projected {
    /// The target is in front of the camera; the pixel may still lie outside the frame.
    InField(Pixel),
    /// The target is 90° or more from the field centre, or beyond the radius where
    /// the distortion polynomial folds back.
    OutOfField,
}

impl Projected {
    pub fn pixel(self) -> Option<Pixel> {
        match self {
            Projected::InField(p) => Some(p),
            Projected::OutOfField => None,
        }
    }

    pub fn is_in_field(&self) -> bool {
        matches!(self, Projected::InField(_))
    }
}

/// Pointing, field of view and lens of a camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Right ascension of the field centre, hours
    pub ra0: Hour,
    /// Declination of the field centre, degrees
    pub dec0: Degree,
    /// Frame width in pixels
    pub size_x: f64,
    /// Frame height in pixels
    pub size_y: f64,
    /// Full horizontal field of view, degrees
    pub scale_x: Degree,
    /// Full vertical field of view, degrees
    pub scale_y: Degree,
    /// Position angle of image-up, degrees
    pub pos_ang: Degree,
    pub distortion: RadialDistortion,
}

/// Vertical field of view of a frame given its horizontal one.
///
/// Arguments
/// -----------------
/// * `scale_x`: horizontal field of view, degrees.
/// * `size_x`, `size_y`: frame dimensions, pixels.
/// * `aspect`: pixel aspect ratio (1 for square pixels).
pub fn vertical_scale(scale_x: Degree, size_x: f64, size_y: f64, aspect: f64) -> Degree {
    let half = (scale_x.to_radians() / 2.0).tan() * size_y / size_x * aspect;
    2.0 * half.atan().to_degrees()
}

impl CameraModel {
    /// Camera with square pixels, the vertical field derived from the horizontal one.
    pub fn new(
        ra0: Hour,
        dec0: Degree,
        size_x: f64,
        size_y: f64,
        scale_x: Degree,
        pos_ang: Degree,
        distortion: RadialDistortion,
    ) -> Self {
        CameraModel {
            ra0,
            dec0,
            size_x,
            size_y,
            scale_x,
            scale_y: vertical_scale(scale_x, size_x, size_y, 1.0),
            pos_ang,
            distortion,
        }
    }

    /// Same camera pointing elsewhere.
    pub fn pointing(&self, ra0: Hour, dec0: Degree, pos_ang: Degree) -> Self {
        CameraModel {
            ra0,
            dec0,
            pos_ang,
            ..*self
        }
    }

    /// Whether a pixel lies inside the frame.
    pub fn contains(&self, pixel: &Pixel) -> bool {
        (0.0..=self.size_x).contains(&pixel.x) && (0.0..=self.size_y).contains(&pixel.y)
    }

    fn half_tan_x(&self) -> f64 {
        (self.scale_x.to_radians() / 2.0).tan()
    }

    fn half_tan_y(&self) -> f64 {
        (self.scale_y.to_radians() / 2.0).tan()
    }

    /// Tangent-plane coordinates of a sky position, or `None` beyond 90° from the centre.
    pub fn to_tangent_plane(&self, ra: Hour, dec: Degree) -> Option<TangentPlane> {
        let d_ra = (ra - self.ra0) * RADH;
        let (dec, dec0) = (dec.to_radians(), self.dec0.to_radians());

        let x1 = dec.cos() * d_ra.cos();
        let y1 = dec.cos() * d_ra.sin();
        let z1 = dec.sin();

        let x2 = x1 * dec0.cos() + z1 * dec0.sin();
        let z2 = -x1 * dec0.sin() + z1 * dec0.cos();
        if x2 <= 0.0 {
            return None;
        }
        Some(TangentPlane {
            xi: y1 / x2,
            eta: z2 / x2,
        })
    }

    /// Sky position of tangent-plane coordinates.
    pub fn from_tangent_plane(&self, tangent: &TangentPlane) -> (Hour, Degree) {
        let dec0 = self.dec0.to_radians();
        let (x2, y2, z2) = (1.0, tangent.xi, tangent.eta);

        let x1 = x2 * dec0.cos() - z2 * dec0.sin();
        let z1 = x2 * dec0.sin() + z2 * dec0.cos();
        let y1 = y2;

        let ra = y1.atan2(x1) / RADH + self.ra0;
        let dec = z1.atan2(x1.hypot(y1)).to_degrees();
        (wrap_24(ra), dec)
    }

    /// Forward projection of a sky position to a pixel.
    ///
    /// See also
    /// ------------
    /// * [`gnomonic_project`] – free-function form.
    /// * [`CameraModel::unproject`] – inverse.
    pub fn project(&self, ra: Hour, dec: Degree) -> Projected {
        let Some(tangent) = self.to_tangent_plane(ra, dec) else {
            return Projected::OutOfField;
        };
        let pa = self.pos_ang.to_radians();
        let left = tangent.xi * pa.cos() - tangent.eta * pa.sin();
        let up = tangent.xi * pa.sin() + tangent.eta * pa.cos();

        let tx = self.half_tan_x();
        let r = left.hypot(up) / tx;
        if self.distortion.turning_radius().is_some_and(|r_max| r >= r_max) {
            return Projected::OutOfField;
        }
        let m = self.distortion.multiplier(r);

        let px = self.size_x / 2.0 - left * m * (self.size_x / 2.0) / tx;
        let py = self.size_y / 2.0 - up * m * (self.size_y / 2.0) / self.half_tan_y();
        if px.is_finite() && py.is_finite() {
            Projected::InField(Pixel::new(px, py))
        } else {
            Projected::OutOfField
        }
    }

    /// Inverse projection of a pixel to a sky position.
    ///
    /// Return
    /// ----------
    /// * `Some((ra_hours, dec°))`, or `None` when the distortion polynomial cannot be
    ///   inverted at that radius.
    pub fn unproject(&self, pixel: &Pixel) -> Option<(Hour, Degree)> {
        let tx = self.half_tan_x();
        let left_d = (self.size_x / 2.0 - pixel.x) * tx / (self.size_x / 2.0);
        let up_d = (self.size_y / 2.0 - pixel.y) * self.half_tan_y() / (self.size_y / 2.0);

        let observed = left_d.hypot(up_d) / tx;
        let r = self.distortion.undistort_radius(observed)?;
        let scale = if observed > 0.0 { r / observed } else { 1.0 };
        let (left, up) = (left_d * scale, up_d * scale);

        let pa = self.pos_ang.to_radians();
        let tangent = TangentPlane {
            xi: left * pa.cos() + up * pa.sin(),
            eta: -left * pa.sin() + up * pa.cos(),
        };
        Some(self.from_tangent_plane(&tangent))
    }
}

/// Forward gnomonic projection with radial distortion.
///
/// Arguments
/// -----------------
/// * `ra`, `dec`: target position (hours, degrees).
/// * `camera`: field centre, frame size, field of view, position angle and distortion.
///
/// Return
/// ----------
/// * [`Projected::InField`] with the pixel, or [`Projected::OutOfField`].
pub fn gnomonic_project(ra: Hour, dec: Degree, camera: &CameraModel) -> Projected {
    camera.project(ra, dec)
}

/// Inverse of [`gnomonic_project`].
pub fn inv_gnom_project(pixel: &Pixel, camera: &CameraModel) -> Option<(Hour, Degree)> {
    camera.unproject(pixel)
}
