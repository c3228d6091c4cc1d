//! Sight lines from the pixel path of an observation.
//!
//! The camera orientation effective at the observation time gives the
//! horizontal pointing and tilt of the frame. With the lens model this maps
//! each path pixel back onto the sky, and the sky direction is turned into an
//! Earth-fixed ray from the station.
use log::debug;

use crate::catalogs::LensCatalogue;
use crate::constants::{Degree, ObservationId, ObservatoryId, UnixTime};
use crate::frames::{GeodeticPosition, Horizontal, Pixel};
use crate::geometry::earth::{point_from_lat_lng, vector_from_ra_dec};
use crate::geometry::{Line, Point};
use crate::orientation::position_angle_from_tilt;
use crate::pigazing_errors::PiGazingError;
use crate::projection::{CameraModel, RadialDistortion};
use crate::sky::alt_az;
use crate::store::{CameraOrientation, Observation, ObservationStore};
use crate::time::sidereal_time;

use super::path::{evenly_spaced, observation_path};

/// A ray from a station towards the object at one instant, Earth-fixed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SightLine {
    pub observation: ObservationId,
    pub observatory: ObservatoryId,
    pub utc: UnixTime,
    pub site: GeodeticPosition,
    /// Origin at the station, unit direction
    pub line: Line,
    pub alt: Degree,
    pub az: Degree,
}

impl SightLine {
    pub fn station(&self) -> Point {
        self.line.origin
    }
}

/// Camera of a station as configured at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct StationCamera {
    pub observatory: ObservatoryId,
    pub site: GeodeticPosition,
    pub size: (f64, f64),
    pub orientation: CameraOrientation,
    pub distortion: RadialDistortion,
}

impl StationCamera {
    /// Camera of the station that recorded `observation`, at its start time.
    ///
    /// Fails with [`PiGazingError::MissingMetadata`] when the lens, the image
    /// size or the orientation is not recorded.
    pub fn for_observation<S: ObservationStore + ?Sized>(
        store: &S,
        observation: &Observation,
        lenses: &LensCatalogue,
    ) -> Result<Self, PiGazingError> {
        let observatory = store.observatory(&observation.observatory)?;
        let status = store.observatory_status(&observation.observatory, observation.utc)?;
        Ok(StationCamera {
            observatory: observatory.id.clone(),
            site: status.position(&observatory),
            size: status.image_size()?,
            orientation: status.orientation()?,
            distortion: status.distortion(lenses)?,
        })
    }

    /// Projection model of the frame at `utc`, centre and position angle of date.
    pub fn camera_model(&self, utc: UnixTime) -> CameraModel {
        let centre = Horizontal::new(self.orientation.altitude, self.orientation.azimuth)
            .to_equatorial(utc, &self.site);
        let pos_ang =
            position_angle_from_tilt(centre.ra, centre.dec, self.orientation.tilt, utc, &self.site);
        CameraModel {
            scale_y: self.orientation.width_y_field,
            ..CameraModel::new(
                centre.ra,
                centre.dec,
                self.size.0,
                self.size.1,
                self.orientation.width_x_field,
                pos_ang,
                self.distortion,
            )
        }
    }

    /// Sight line through `pixel` at `utc`, `None` when the pixel cannot be unprojected.
    pub fn sight_line(&self, observation: &str, pixel: &Pixel, utc: UnixTime) -> Option<SightLine> {
        let (ra, dec) = self.camera_model(utc).unproject(pixel)?;
        let (alt, az) = alt_az(ra, dec, utc, self.site.lat, self.site.lng);
        let direction = vector_from_ra_dec(ra - sidereal_time(utc), dec);
        let station = point_from_lat_lng(self.site.lat, self.site.lng, self.site.alt, None);
        Some(SightLine {
            observation: observation.to_string(),
            observatory: self.observatory.clone(),
            utc,
            site: self.site,
            line: Line::new(station, direction),
            alt,
            az,
        })
    }
}

/// Sight lines of an observation, at most `max_samples`.
///
/// Return
/// ----------
/// * The sight lines and whether the path had to be repaired.
pub fn observation_sight_lines<S: ObservationStore + ?Sized>(
    store: &S,
    observation: &Observation,
    lenses: &LensCatalogue,
    max_samples: usize,
) -> Result<(Vec<SightLine>, bool), PiGazingError> {
    let camera = StationCamera::for_observation(store, observation, lenses)?;
    let path = observation_path(observation)?;
    let samples = evenly_spaced(&path.points, max_samples);
    let lines: Vec<SightLine> = samples
        .iter()
        .filter_map(|p| camera.sight_line(&observation.id, &p.pixel, p.utc))
        .collect();
    if lines.len() < samples.len() {
        debug!(
            "{}: {} of {} path point(s) could not be unprojected",
            observation.id,
            samples.len() - lines.len(),
            samples.len()
        );
    }
    Ok((lines, path.rescued))
}

#[cfg(test)]
mod sight_line_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn camera(alt: f64, az: f64, tilt: f64) -> StationCamera {
        StationCamera {
            observatory: "north".into(),
            site: GeodeticPosition::new(52.2, 0.1, 20.0),
            size: (1920.0, 1080.0),
            orientation: CameraOrientation {
                altitude: alt,
                azimuth: az,
                pa: None,
                tilt,
                width_x_field: 60.0,
                width_y_field: 35.0,
                uncertainty: None,
                epoch: 0.0,
            },
            distortion: RadialDistortion::new(0.02, 0.0, 0.0),
        }
    }

    #[test]
    fn test_centre_pixel_points_along_orientation() {
        let utc = 1_600_000_000.0;
        let cam = camera(40.0, 135.0, 12.0);
        let line = cam.sight_line("obs", &Pixel::new(960.0, 540.0), utc).unwrap();
        assert_abs_diff_eq!(line.alt, 40.0, epsilon = 1e-6);
        assert_abs_diff_eq!(line.az, 135.0, epsilon = 1e-6);
        assert_abs_diff_eq!(line.line.direction.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_projection_and_sight_line_agree() {
        // A pixel projected from a known direction comes back along that direction
        let utc = 1_600_000_000.0;
        let cam = camera(30.0, 200.0, -5.0);
        let model = cam.camera_model(utc);
        let target = Horizontal::new(38.0, 190.0).to_equatorial(utc, &cam.site);
        let pixel = model.project(target.ra, target.dec).pixel().unwrap();
        let line = cam.sight_line("obs", &pixel, utc).unwrap();
        assert_abs_diff_eq!(line.alt, 38.0, epsilon = 1e-6);
        assert_abs_diff_eq!(line.az, 190.0, epsilon = 1e-6);
    }

    #[test]
    fn test_tilt_rotates_image_up_towards_zenith() {
        // Without tilt, the top-centre pixel is straight above the frame centre
        let utc = 1_600_000_000.0;
        let cam = camera(30.0, 90.0, 0.0);
        let up = cam.sight_line("obs", &Pixel::new(960.0, 100.0), utc).unwrap();
        assert!(up.alt > 30.0);
        assert_abs_diff_eq!(up.az, 90.0, epsilon = 1e-6);
    }
}
