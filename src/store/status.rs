//! Effective state of an observatory at an instant.
//!
//! Observatory metadata records carry an effective time; the status at `t` is
//! obtained by applying, in time order, every record with time `≤ t`, so the
//! most recent value of each key wins. Known keys populate typed fields;
//! unknown keys land in [`ObservatoryStatus::extensions`].
use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::catalogs::{LensCatalogue, LensModel};
use crate::constants::{Degree, Meter, ObservatoryId, UnixTime};
use crate::frames::GeodeticPosition;
use crate::pigazing_errors::PiGazingError;
use crate::projection::RadialDistortion;

use super::keys::{MetaValue, StatusKey};
use super::Observatory;

/// Pointing of a camera as fitted by the orientation estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraOrientation {
    /// Altitude of the frame centre, `[-90, 90]`
    pub altitude: Degree,
    /// Azimuth of the frame centre, `[0, 360)`
    pub azimuth: Degree,
    /// Celestial position angle of image-up, when recorded
    pub pa: Option<Degree>,
    /// Angle from image-up to the zenith direction
    pub tilt: Degree,
    pub width_x_field: Degree,
    pub width_y_field: Degree,
    pub uncertainty: Option<Degree>,
    /// Effective time of the orientation record
    pub epoch: UnixTime,
}

/// Typed view of an observatory's metadata at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservatoryStatus {
    pub observatory: ObservatoryId,
    pub latitude: Option<Degree>,
    pub longitude: Option<Degree>,
    pub altitude: Option<Meter>,
    pub lens: Option<String>,
    pub image_width: Option<f64>,
    pub image_height: Option<f64>,
    pub lens_barrel: [Option<f64>; 3],
    pub orientation_altitude: Option<Degree>,
    pub orientation_azimuth: Option<Degree>,
    pub orientation_pa: Option<Degree>,
    pub orientation_tilt: Option<Degree>,
    pub orientation_width_x_field: Option<Degree>,
    pub orientation_width_y_field: Option<Degree>,
    pub orientation_uncertainty: Option<Degree>,
    pub orientation_image_count: Option<f64>,
    pub orientation_epoch: Option<UnixTime>,
    pub extensions: BTreeMap<String, MetaValue>,
}

impl ObservatoryStatus {
    pub fn new(observatory: impl Into<ObservatoryId>) -> Self {
        ObservatoryStatus {
            observatory: observatory.into(),
            ..Default::default()
        }
    }

    /// Apply one metadata record effective at `time`.
    pub fn apply(&mut self, key: &StatusKey, value: &MetaValue, time: UnixTime) {
        let number = || {
            let v = value.as_f64();
            if v.is_none() {
                warn!(
                    "{}: ignoring non-numeric value '{value}' for '{key}'",
                    self.observatory
                );
            }
            v
        };
        match key {
            StatusKey::Latitude => self.latitude = number().or(self.latitude),
            StatusKey::Longitude => self.longitude = number().or(self.longitude),
            StatusKey::Altitude => self.altitude = number().or(self.altitude),
            StatusKey::Lens => self.lens = Some(value.to_string()),
            StatusKey::ImageWidth => self.image_width = number().or(self.image_width),
            StatusKey::ImageHeight => self.image_height = number().or(self.image_height),
            StatusKey::LensBarrelK1 => self.lens_barrel[0] = number().or(self.lens_barrel[0]),
            StatusKey::LensBarrelK2 => self.lens_barrel[1] = number().or(self.lens_barrel[1]),
            StatusKey::LensBarrelK3 => self.lens_barrel[2] = number().or(self.lens_barrel[2]),
            StatusKey::OrientationAltitude => {
                self.orientation_altitude = number().or(self.orientation_altitude);
                self.orientation_epoch = Some(time);
            }
            StatusKey::OrientationAzimuth => {
                self.orientation_azimuth = number().or(self.orientation_azimuth)
            }
            StatusKey::OrientationPa => self.orientation_pa = number().or(self.orientation_pa),
            StatusKey::OrientationTilt => {
                self.orientation_tilt = number().or(self.orientation_tilt)
            }
            StatusKey::OrientationWidthXField => {
                self.orientation_width_x_field = number().or(self.orientation_width_x_field)
            }
            StatusKey::OrientationWidthYField => {
                self.orientation_width_y_field = number().or(self.orientation_width_y_field)
            }
            StatusKey::OrientationUncertainty => {
                self.orientation_uncertainty = number().or(self.orientation_uncertainty)
            }
            StatusKey::OrientationImageCount => {
                self.orientation_image_count = number().or(self.orientation_image_count)
            }
            StatusKey::Other(name) => {
                self.extensions.insert(name.clone(), value.clone());
            }
        }
    }

    fn subject(&self) -> String {
        format!("observatory {}", self.observatory)
    }

    fn require(&self, value: Option<f64>, key: StatusKey) -> Result<f64, PiGazingError> {
        value.ok_or_else(|| PiGazingError::missing(self.subject(), key.name()))
    }

    /// Station position, corrected by any position metadata.
    pub fn position(&self, observatory: &Observatory) -> GeodeticPosition {
        GeodeticPosition::new(
            self.latitude.unwrap_or(observatory.lat),
            self.longitude.unwrap_or(observatory.lng),
            self.altitude.unwrap_or(observatory.alt),
        )
    }

    /// Image dimensions `(width, height)` in pixels.
    pub fn image_size(&self) -> Result<(f64, f64), PiGazingError> {
        Ok((
            self.require(self.image_width, StatusKey::ImageWidth)?,
            self.require(self.image_height, StatusKey::ImageHeight)?,
        ))
    }

    /// Lens fitted to the camera.
    pub fn lens<'a>(&self, lenses: &'a LensCatalogue) -> Result<&'a LensModel, PiGazingError> {
        let name = self
            .lens
            .as_deref()
            .ok_or_else(|| PiGazingError::missing(self.subject(), StatusKey::Lens.name()))?;
        lenses.get(name)
    }

    /// Distortion of the camera lens.
    ///
    /// Calibrated barrel coefficients recorded on the observatory take precedence
    /// over the nominal values of the lens catalogue.
    pub fn distortion(&self, lenses: &LensCatalogue) -> Result<RadialDistortion, PiGazingError> {
        if let [Some(k1), Some(k2), Some(k3)] = self.lens_barrel {
            return Ok(RadialDistortion::new(k1, k2, k3));
        }
        Ok(self.lens(lenses)?.distortion())
    }

    /// Most recent camera orientation.
    pub fn orientation(&self) -> Result<CameraOrientation, PiGazingError> {
        Ok(CameraOrientation {
            altitude: self.require(self.orientation_altitude, StatusKey::OrientationAltitude)?,
            azimuth: self.require(self.orientation_azimuth, StatusKey::OrientationAzimuth)?,
            pa: self.orientation_pa,
            tilt: self.require(self.orientation_tilt, StatusKey::OrientationTilt)?,
            width_x_field: self
                .require(self.orientation_width_x_field, StatusKey::OrientationWidthXField)?,
            width_y_field: self
                .require(self.orientation_width_y_field, StatusKey::OrientationWidthYField)?,
            uncertainty: self.orientation_uncertainty,
            epoch: self.orientation_epoch.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod status_test {
    use super::*;
    use crate::catalogs::LensModel;

    fn lenses() -> LensCatalogue {
        LensCatalogue::from_lenses([LensModel {
            name: "wide".into(),
            fov_deg: 60.0,
            barrel_k1: 0.01,
            barrel_k2: 0.0,
            barrel_k3: 0.0,
        }])
    }

    #[test]
    fn test_apply_and_getters() {
        let mut status = ObservatoryStatus::new("eddington0");
        status.apply(&StatusKey::Lens, &"wide".into(), 0.0);
        status.apply(&StatusKey::ImageWidth, &1920.0.into(), 0.0);
        status.apply(&StatusKey::ImageHeight, &"1080".into(), 0.0);
        status.apply(&StatusKey::from("camera_fps"), &25.0.into(), 0.0);
        assert_eq!(status.image_size().unwrap(), (1920.0, 1080.0));
        assert_eq!(status.extensions["camera_fps"], MetaValue::Number(25.0));
        assert_eq!(
            status.distortion(&lenses()).unwrap(),
            RadialDistortion::new(0.01, 0.0, 0.0)
        );
        for (i, key) in StatusKey::LENS_BARREL.iter().enumerate() {
            let k = if i == 0 { 0.02 } else { 0.0 };
            status.apply(key, &k.into(), 5.0);
        }
        assert_eq!(
            status.distortion(&lenses()).unwrap(),
            RadialDistortion::new(0.02, 0.0, 0.0)
        );
    }

    #[test]
    fn test_missing_orientation() {
        let mut status = ObservatoryStatus::new("eddington0");
        status.apply(&StatusKey::OrientationAltitude, &45.0.into(), 10.0);
        assert_eq!(
            status.orientation().unwrap_err(),
            PiGazingError::missing("observatory eddington0", "orientation:azimuth")
        );
        assert_eq!(status.orientation_epoch, Some(10.0));
        assert!(matches!(
            status.lens(&lenses()).unwrap_err(),
            PiGazingError::MissingMetadata { .. }
        ));
    }
}
