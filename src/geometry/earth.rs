//! Conversions between Earth-centred Cartesian coordinates and
//! geodetic `(latitude, longitude, altitude)` on a spherical Earth, and between
//! unit direction vectors and celestial `(RA, Dec)`.
//!
//! The Earth-centred frame has its z axis through the north pole. Without a time
//! the x axis passes through the Greenwich meridian (Earth-fixed frame). When a
//! unix time is supplied, positions are rotated by Greenwich sidereal time so that
//! the x axis points to the vernal equinox (celestial frame).

use crate::constants::{wrap_24, wrap_360, Degree, Hour, Meter, UnixTime, EARTH_RADIUS, RADH};
use crate::time::sidereal_time;

use super::{Point, Vector};

/// Longitude rotation in degrees applied by the optional sidereal time.
fn sidereal_offset(utc: Option<UnixTime>) -> Degree {
    utc.map(|t| sidereal_time(t) * 15.0).unwrap_or(0.0)
}

/// Earth-centred position of a geodetic location.
///
/// Arguments
/// -----------------
/// * `lat`: latitude in degrees.
/// * `lng`: longitude in degrees east.
/// * `alt`: altitude above the spherical Earth (radius 6 371 km) in meters.
/// * `utc`: when given, rotate by Greenwich sidereal time into the celestial frame.
///
/// Return
/// ----------
/// * The Cartesian [`Point`] in meters.
pub fn point_from_lat_lng(lat: Degree, lng: Degree, alt: Meter, utc: Option<UnixTime>) -> Point {
    let r = EARTH_RADIUS + alt;
    let lat = lat.to_radians();
    let lng = (lng + sidereal_offset(utc)).to_radians();
    Point::new(
        r * lat.cos() * lng.cos(),
        r * lat.cos() * lng.sin(),
        r * lat.sin(),
    )
}

/// Inverse of [`point_from_lat_lng`].
///
/// Return
/// ----------
/// * `(lat°, lng°, alt_m)` with the longitude wrapped into `[0, 360)`.
pub fn point_to_lat_lng(point: &Point, utc: Option<UnixTime>) -> (Degree, Degree, Meter) {
    let r = point.to_vector().norm();
    if r == 0.0 {
        return (0.0, 0.0, -EARTH_RADIUS);
    }
    let lat = (point.z / r).clamp(-1.0, 1.0).asin().to_degrees();
    let lng = point.y.atan2(point.x).to_degrees() - sidereal_offset(utc);
    (lat, wrap_360(lng), r - EARTH_RADIUS)
}

/// Unit vector pointing at `(ra, dec)`.
///
/// Arguments
/// -----------------
/// * `ra`: right ascension in hours.
/// * `dec`: declination in degrees.
pub fn vector_from_ra_dec(ra: Hour, dec: Degree) -> Vector {
    let ra = ra * RADH;
    let dec = dec.to_radians();
    Vector::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin())
}

/// Direction of a vector as `(ra_hours ∈ [0, 24), dec° ∈ [-90, 90])`.
///
/// A zero vector returns `(0, 0)`.
pub fn vector_to_ra_dec(v: &Vector) -> (Hour, Degree) {
    let n = v.norm();
    if n == 0.0 || !n.is_finite() {
        return (0.0, 0.0);
    }
    let dec = (v.z / n).clamp(-1.0, 1.0).asin().to_degrees();
    let ra = wrap_24(v.y.atan2(v.x) / RADH);
    (ra, dec)
}

/// Great-circle distance between two geodetic positions on the spherical Earth, in meters.
pub fn great_circle_distance(lat1: Degree, lng1: Degree, lat2: Degree, lng2: Degree) -> Meter {
    let a = vector_from_ra_dec(lng1 / 15.0, lat1);
    let b = vector_from_ra_dec(lng2 / 15.0, lat2);
    a.angle_with(&b) * EARTH_RADIUS
}
