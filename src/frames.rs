//! # Typed coordinate frames
//!
//! Each frame the pipeline manipulates is a distinct type so that a position
//! cannot be fed to a conversion expecting another frame:
//!
//! | Type | Frame | Units |
//! |---|---|---|
//! | [`Pixel`] | image-local, origin top-left, y down | pixels |
//! | [`TangentPlane`] | gnomonic plane at a field centre | dimensionless (tan of angle) |
//! | [`EquatorialJ2000`] | mean equator & equinox J2000.0 | RA hours, Dec degrees |
//! | [`EquatorialAtEpoch`] | mean equator & equinox of date | RA hours, Dec degrees |
//! | [`Horizontal`] | station-local alt-az | degrees |
//! | [`GeodeticPosition`] | spherical Earth lat/lng/alt | degrees, meters |
//! | [`EarthCentred`] | Cartesian, z through the pole | meters |
//!
//! Conversions are explicit, total methods. Catalogue stars and plate-solver
//! output are J2000; horizontal coordinates are always derived from positions of date.
use serde::{Deserialize, Serialize};

use crate::constants::{Degree, Hour, Meter, UnixTime};
use crate::geometry::earth::{point_from_lat_lng, point_to_lat_lng};
use crate::geometry::Point;
use crate::sky::{alt_az, epoch_to_j2000, j2000_to_epoch, ra_dec};

/// Position in an image, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

impl Pixel {
    pub fn new(x: f64, y: f64) -> Self {
        Pixel { x, y }
    }

    pub fn distance_to(&self, other: &Pixel) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Coordinates on the tangent plane at a field centre, before rotation by position angle.
///
/// `xi` grows towards east, `eta` towards north.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TangentPlane {
    pub xi: f64,
    pub eta: f64,
}

/// Celestial position referred to the J2000.0 equator and equinox.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EquatorialJ2000 {
    pub ra: Hour,
    pub dec: Degree,
}

/// Celestial position referred to the mean equator and equinox of `utc`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EquatorialAtEpoch {
    pub ra: Hour,
    pub dec: Degree,
    pub utc: UnixTime,
}

/// Altitude above the horizon and azimuth from north through east.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Horizontal {
    pub alt: Degree,
    pub az: Degree,
}

/// Location on the spherical Earth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub lat: Degree,
    pub lng: Degree,
    pub alt: Meter,
}

/// Earth-centred Cartesian position in meters.
///
/// Whether the x axis follows Greenwich or the vernal equinox depends on the `utc`
/// passed to the conversion that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EarthCentred(pub Point);

impl EquatorialJ2000 {
    pub fn new(ra: Hour, dec: Degree) -> Self {
        EquatorialJ2000 { ra, dec }
    }

    /// Precess to the mean equator and equinox of `utc`.
    pub fn at_epoch(&self, utc: UnixTime) -> EquatorialAtEpoch {
        let (ra, dec) = j2000_to_epoch(self.ra, self.dec, utc);
        EquatorialAtEpoch { ra, dec, utc }
    }
}

impl EquatorialAtEpoch {
    pub fn new(ra: Hour, dec: Degree, utc: UnixTime) -> Self {
        EquatorialAtEpoch { ra, dec, utc }
    }

    pub fn to_j2000(&self) -> EquatorialJ2000 {
        let (ra, dec) = epoch_to_j2000(self.ra, self.dec, self.utc);
        EquatorialJ2000 { ra, dec }
    }

    /// Horizontal coordinates seen from `site` at this position's epoch.
    pub fn to_horizontal(&self, site: &GeodeticPosition) -> Horizontal {
        let (alt, az) = alt_az(self.ra, self.dec, self.utc, site.lat, site.lng);
        Horizontal { alt, az }
    }
}

impl Horizontal {
    pub fn new(alt: Degree, az: Degree) -> Self {
        Horizontal { alt, az }
    }

    /// Equatorial coordinates of date of this direction seen from `site` at `utc`.
    pub fn to_equatorial(&self, utc: UnixTime, site: &GeodeticPosition) -> EquatorialAtEpoch {
        let (ra, dec) = ra_dec(self.alt, self.az, utc, site.lat, site.lng);
        EquatorialAtEpoch { ra, dec, utc }
    }
}

impl GeodeticPosition {
    pub fn new(lat: Degree, lng: Degree, alt: Meter) -> Self {
        GeodeticPosition { lat, lng, alt }
    }

    /// Cartesian position; rotated into the celestial frame when `utc` is given.
    pub fn to_earth_centred(&self, utc: Option<UnixTime>) -> EarthCentred {
        EarthCentred(point_from_lat_lng(self.lat, self.lng, self.alt, utc))
    }
}

impl EarthCentred {
    pub fn to_geodetic(&self, utc: Option<UnixTime>) -> GeodeticPosition {
        let (lat, lng, alt) = point_to_lat_lng(&self.0, utc);
        GeodeticPosition { lat, lng, alt }
    }
}

#[cfg(test)]
mod frames_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_equatorial_horizontal_round_trip() {
        let site = GeodeticPosition::new(52.2, 0.12, 20.0);
        let star = EquatorialJ2000::new(5.919_5, 7.407);
        let of_date = star.at_epoch(1_609_459_200.0);
        let horizontal = of_date.to_horizontal(&site);
        let back = horizontal.to_equatorial(of_date.utc, &site).to_j2000();
        assert_relative_eq!(back.ra, star.ra, epsilon = 1e-9);
        assert_relative_eq!(back.dec, star.dec, epsilon = 1e-9);
    }

    #[test]
    fn test_geodetic_round_trip() {
        let site = GeodeticPosition::new(-12.5, 200.0, 1_234.0);
        let back = site.to_earth_centred(Some(1.7e9)).to_geodetic(Some(1.7e9));
        assert_relative_eq!(back.lat, site.lat, epsilon = 1e-9);
        assert_relative_eq!(back.lng, site.lng, epsilon = 1e-9);
        assert_relative_eq!(back.alt, site.alt, epsilon = 1e-6);
    }
}
