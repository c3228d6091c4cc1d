//! Satellite tracks propagated from two-line element sets.
//!
//! The catalogue file holds three-line sets: a name line followed by the two
//! element lines. Positions are propagated with SGP4 in the TEME frame and
//! rotated into the Earth-fixed frame by Greenwich sidereal time.
use camino::Utf8Path;
use log::{info, warn};

use crate::constants::UnixTime;
use crate::frames::EarthCentred;
use crate::geometry::Point;
use crate::pigazing_errors::PiGazingError;
use crate::store::TrackKind;
use crate::time::gmst;

use super::interpolate::{Track, TrackPoint};
use super::{CandidateTrack, TrackSource};

/// One satellite and its SGP4 model.
pub struct Satellite {
    pub name: String,
    pub norad_id: u64,
    /// Epoch of the element set
    pub epoch: UnixTime,
    constants: sgp4::Constants,
}

impl std::fmt::Debug for Satellite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Satellite")
            .field("name", &self.name)
            .field("norad_id", &self.norad_id)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl Satellite {
    pub fn from_tle(name: &str, line1: &str, line2: &str) -> Result<Self, PiGazingError> {
        let elements = sgp4::Elements::from_tle(
            Some(name.trim().to_string()),
            line1.as_bytes(),
            line2.as_bytes(),
        )
        .map_err(|e| PiGazingError::Tle(format!("{}: {e}", name.trim())))?;
        let constants = sgp4::Constants::from_elements(&elements)
            .map_err(|e| PiGazingError::Tle(format!("{}: {e}", name.trim())))?;
        let epoch = elements.datetime.and_utc().timestamp_micros() as f64 / 1e6;
        Ok(Satellite {
            name: name.trim().to_string(),
            norad_id: elements.norad_id,
            epoch,
            constants,
        })
    }

    /// Position and speed at `utc`, `None` when propagation fails (decayed orbit).
    pub fn position(&self, utc: UnixTime) -> Option<TrackPoint> {
        let minutes = (utc - self.epoch) / 60.0;
        let prediction = self.constants.propagate(sgp4::MinutesSinceEpoch(minutes)).ok()?;
        let [x, y, z] = prediction.position;
        let theta = gmst(utc);
        let (s, c) = theta.sin_cos();
        // TEME to Earth-fixed, kilometres to meters
        let fixed = Point::new(
            (x * c + y * s) * 1_000.0,
            (-x * s + y * c) * 1_000.0,
            z * 1_000.0,
        );
        let site = EarthCentred(fixed).to_geodetic(None);
        let [vx, vy, vz] = prediction.velocity;
        Some(TrackPoint {
            utc,
            lat: site.lat,
            lng: site.lng,
            altitude: site.alt,
            speed: (vx * vx + vy * vy + vz * vz).sqrt() * 1_000.0,
        })
    }

    /// Positions every `step` seconds over `[utc_min, utc_max]`, both ends included.
    pub fn track(&self, utc_min: UnixTime, utc_max: UnixTime, step: f64) -> Track {
        let step = if step > 0.0 { step } else { 1.0 };
        let count = ((utc_max - utc_min) / step).ceil().max(0.0) as usize;
        let points = (0..=count)
            .map(|i| (utc_min + i as f64 * step).min(utc_max))
            .filter_map(|utc| self.position(utc))
            .collect();
        Track::new(points)
    }
}

/// Element sets of a satellite catalogue.
#[derive(Debug, Default)]
pub struct SatelliteCatalogue {
    satellites: Vec<Satellite>,
    /// Sampling interval of propagated tracks, seconds
    step: f64,
}

impl SatelliteCatalogue {
    /// Parse three-line element sets; sets that do not parse are skipped with a warning.
    pub fn from_tle_str(text: &str, step: f64) -> Self {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut satellites = Vec::with_capacity(lines.len() / 3);
        for set in lines.chunks(3) {
            let [name, line1, line2] = set else {
                warn!("incomplete element set at end of catalogue");
                break;
            };
            match Satellite::from_tle(name, line1, line2) {
                Ok(s) => satellites.push(s),
                Err(e) => warn!("{e}"),
            }
        }
        SatelliteCatalogue { satellites, step }
    }

    pub fn from_tle_file(path: &Utf8Path, step: f64) -> Result<Self, PiGazingError> {
        let catalogue = Self::from_tle_str(&std::fs::read_to_string(path)?, step);
        info!("{path}: {} satellite(s)", catalogue.len());
        Ok(catalogue)
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }

    pub fn satellites(&self) -> &[Satellite] {
        &self.satellites
    }
}

impl TrackSource for SatelliteCatalogue {
    fn kind(&self) -> TrackKind {
        TrackKind::Satellite
    }

    fn candidates(&self, utc_min: UnixTime, utc_max: UnixTime) -> Result<Vec<CandidateTrack>, PiGazingError> {
        Ok(self
            .satellites
            .iter()
            .map(|s| CandidateTrack {
                kind: TrackKind::Satellite,
                designation: s.name.clone(),
                ident: s.norad_id.to_string(),
                operator: None,
                model: None,
                manufacturer: None,
                track: s.track(utc_min, utc_max, self.step),
            })
            .filter(|c| !c.track.is_empty())
            .collect())
    }
}
