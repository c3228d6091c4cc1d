//! # Spherical astronomy primitives
//!
//! Positional astronomy needed by the camera pipeline, expressed with the same
//! unit conventions as the rest of the crate: right ascension in **hours**,
//! declination, altitude and azimuth in **degrees**, instants as unix time.
//!
//! ## Contents
//!
//! - [`sun_position`] – truncated Meeus solar series (≈0.01° accuracy).
//! - [`alt_az`] / [`ra_dec`] – equatorial-of-date ↔ horizontal conversion for a station.
//! - [`rise_culmination_set`] – rise / transit / set times of a fixed target.
//! - [`precession_matrix`], [`j2000_to_epoch`], [`epoch_to_j2000`] – IAU 1976 precession.
//! - [`position_angle`] and [`ang_dist`] – relations between two sky positions.
//! - [`means`] – circular and spherical weighted means with spread.
//!
//! Azimuth is measured from north through east, in `[0, 360)`. Position angles are
//! measured from celestial north towards east.
//!
//! ## Frames
//!
//! Stars and plate-solver results are J2000. Alt-az conversions work with the
//! equator and equinox **of date**; use [`j2000_to_epoch`] first. The difference
//! is about 0.3° for 2020-era data and must not be ignored when fitting
//! orientations to better than a pixel.
pub mod means;

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::constants::{
    wrap_24, wrap_360, Degree, Hour, Radian, UnixTime, RADH, SECONDS_PER_DAY, SIDEREAL_RATE,
};
use crate::geometry::earth::{vector_from_ra_dec, vector_to_ra_dec};
use crate::time::{centuries_since_j2000, days_since_j2000, sidereal_time};

/// Apparent `(RA_hours, Dec°)` of the Sun.
///
/// Arguments
/// -----------------
/// * `utc`: unix time.
///
/// Return
/// ----------
/// * Right ascension in hours `[0, 24)` and declination in degrees.
///
/// Details
/// ----------
/// Low-precision series from Meeus, *Astronomical Algorithms*, chapter 25, in days
/// `n` since J2000.0:
///
/// ```text
/// L = 280.460 + 0.9856474 n          (mean longitude)
/// g = 357.528 + 0.9856003 n          (mean anomaly)
/// λ = L + 1.915 sin g + 0.020 sin 2g (ecliptic longitude)
/// ε = 23.439 − 0.0000004 n           (obliquity)
/// ```
pub fn sun_position(utc: UnixTime) -> (Hour, Degree) {
    let n = days_since_j2000(utc);
    let mean_longitude = 280.460 + 0.985_647_4 * n;
    let mean_anomaly = (357.528 + 0.985_600_3 * n).to_radians();
    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
    .to_radians();
    let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

    let ra = (obliquity.cos() * ecliptic_longitude.sin()).atan2(ecliptic_longitude.cos());
    let dec = (obliquity.sin() * ecliptic_longitude.sin()).asin();
    (wrap_24(ra / RADH), dec.to_degrees())
}

/// Local hour angle of `ra` at a station, in hours.
fn hour_angle(ra: Hour, utc: UnixTime, lng: Degree) -> Hour {
    sidereal_time(utc) + lng / 15.0 - ra
}

/// Convert equatorial coordinates of date into horizontal coordinates.
///
/// Arguments
/// -----------------
/// * `ra`, `dec`: right ascension (hours) and declination (degrees) of date.
/// * `utc`: unix time of the observation.
/// * `lat`, `lng`: station latitude and longitude (degrees, east positive).
///
/// Return
/// ----------
/// * `(altitude°, azimuth°)`, azimuth in `[0, 360)` from north through east.
///
/// See also
/// ------------
/// * [`ra_dec`] – exact inverse.
pub fn alt_az(ra: Hour, dec: Degree, utc: UnixTime, lat: Degree, lng: Degree) -> (Degree, Degree) {
    let ha = hour_angle(ra, utc, lng) * RADH;
    let dec = dec.to_radians();
    let lat = lat.to_radians();

    let sin_alt = dec.sin() * lat.sin() + dec.cos() * lat.cos() * ha.cos();
    let alt = sin_alt.clamp(-1.0, 1.0).asin();
    let az = (-ha.sin() * dec.cos()).atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * ha.cos());
    (alt.to_degrees(), wrap_360(az.to_degrees()))
}

/// Convert horizontal coordinates into equatorial coordinates of date.
///
/// Return
/// ----------
/// * `(ra_hours ∈ [0, 24), dec°)`.
pub fn ra_dec(alt: Degree, az: Degree, utc: UnixTime, lat: Degree, lng: Degree) -> (Hour, Degree) {
    let alt = alt.to_radians();
    let az = az.to_radians();
    let lat = lat.to_radians();

    let sin_dec = alt.sin() * lat.sin() + alt.cos() * lat.cos() * az.cos();
    let dec = sin_dec.clamp(-1.0, 1.0).asin();
    let ha = (-az.sin() * alt.cos()).atan2(alt.sin() * lat.cos() - alt.cos() * lat.sin() * az.cos());
    let ra = sidereal_time(utc) + lng / 15.0 - ha / RADH;
    (wrap_24(ra), dec.to_degrees())
}

/// Rise, culmination and set of a fixed target over one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiseSet {
    /// The target crosses the horizon twice around its culmination.
    Events {
        rise: UnixTime,
        culmination: UnixTime,
        set: UnixTime,
    },
    /// The target never sets.
    Circumpolar { culmination: UnixTime },
    /// The target never rises.
    NeverRises { culmination: UnixTime },
}

impl RiseSet {
    pub fn culmination(&self) -> UnixTime {
        match *self {
            RiseSet::Events { culmination, .. }
            | RiseSet::Circumpolar { culmination }
            | RiseSet::NeverRises { culmination } => culmination,
        }
    }
}

/// Times at which a target rises above, culminates, and sets below a horizon.
///
/// Arguments
/// -----------------
/// * `ra`, `dec`: target position of date (hours, degrees).
/// * `utc`: any instant within the UTC day of interest.
/// * `lat`, `lng`: station position (degrees).
/// * `horizon`: altitude of the effective horizon in degrees (e.g. `-0.833` for the
///   Sun's upper limb with standard refraction, `-12` for nautical twilight).
///
/// Return
/// ----------
/// * [`RiseSet::Events`] with unix times, the culmination lying in the UTC day
///   containing `utc` and rise/set on either side of it, or a sentinel when the
///   declination makes crossing the horizon impossible.
pub fn rise_culmination_set(
    ra: Hour,
    dec: Degree,
    utc: UnixTime,
    lat: Degree,
    lng: Degree,
    horizon: Degree,
) -> RiseSet {
    let day_start = (utc / SECONDS_PER_DAY).floor() * SECONDS_PER_DAY;
    let ha_start = hour_angle(ra, day_start, lng);
    // Sidereal hours until the hour angle next reaches zero
    let to_transit = (-ha_start).rem_euclid(24.0);
    let culmination = day_start + to_transit / SIDEREAL_RATE * 3600.0;

    let (phi, delta, h0) = (lat.to_radians(), dec.to_radians(), horizon.to_radians());
    let cos_h0 = (h0.sin() - phi.sin() * delta.sin()) / (phi.cos() * delta.cos());
    if !cos_h0.is_finite() || cos_h0 < -1.0 {
        return RiseSet::Circumpolar { culmination };
    }
    if cos_h0 > 1.0 {
        return RiseSet::NeverRises { culmination };
    }
    let half_arc = cos_h0.acos() / RADH / SIDEREAL_RATE * 3600.0;
    RiseSet::Events {
        rise: culmination - half_arc,
        culmination,
        set: culmination + half_arc,
    }
}

/// Altitude of the Sun seen from a station.
pub fn sun_altitude(utc: UnixTime, lat: Degree, lng: Degree) -> Degree {
    let (ra, dec) = sun_position(utc);
    alt_az(ra, dec, utc, lat, lng).0
}

/// IAU 1976 precession matrix from the mean equator and equinox of J2000.0 to those of date.
///
/// Arguments
/// -----------------
/// * `utc`: unix time of the target epoch.
///
/// Return
/// ----------
/// * The rotation `P` such that `r_date = P · r_J2000`.
///
/// Details
/// ----------
/// Built from the three Lieske angles `ζ`, `θ`, `z` as `Rz(z) · Ry(−θ) · Rz(ζ)` with active
/// rotations. The inverse is the transpose.
pub fn precession_matrix(utc: UnixTime) -> Matrix3<f64> {
    let t = centuries_since_j2000(utc);
    let t2 = t * t;
    let t3 = t2 * t;
    let zeta = (0.640_616_1 * t + 0.000_083_9 * t2 + 0.000_005_0 * t3).to_radians();
    let theta = (0.556_753_0 * t - 0.000_118_5 * t2 - 0.000_011_6 * t3).to_radians();
    let z = (0.640_616_1 * t + 0.000_304_1 * t2 + 0.000_005_1 * t3).to_radians();

    let rz = |angle: Radian| Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
    let ry = |angle: Radian| Rotation3::from_axis_angle(&Vector3::y_axis(), angle);
    (rz(z) * ry(-theta) * rz(zeta)).into_inner()
}

fn rotate_ra_dec(matrix: &Matrix3<f64>, ra: Hour, dec: Degree) -> (Hour, Degree) {
    let v = vector_from_ra_dec(ra, dec).to_na();
    vector_to_ra_dec(&crate::geometry::Vector::from_na(&(matrix * v)))
}

/// Precess a J2000 position to the mean equator and equinox of `utc`.
pub fn j2000_to_epoch(ra: Hour, dec: Degree, utc: UnixTime) -> (Hour, Degree) {
    rotate_ra_dec(&precession_matrix(utc), ra, dec)
}

/// Precess a position of date at `utc` back to J2000.
pub fn epoch_to_j2000(ra: Hour, dec: Degree, utc: UnixTime) -> (Hour, Degree) {
    rotate_ra_dec(&precession_matrix(utc).transpose(), ra, dec)
}

/// Position angle of point 2 seen from point 1, in degrees from north through east.
///
/// Arguments
/// -----------------
/// * `ra1`, `dec1`: reference point (hours, degrees).
/// * `ra2`, `dec2`: target point (hours, degrees).
///
/// Return
/// ----------
/// * Angle in `(-180, 180]` degrees.
pub fn position_angle(ra1: Hour, dec1: Degree, ra2: Hour, dec2: Degree) -> Degree {
    let d_ra = (ra2 - ra1) * RADH;
    let (dec1, dec2) = (dec1.to_radians(), dec2.to_radians());
    let y = d_ra.sin() * dec2.cos();
    let x = dec1.cos() * dec2.sin() - dec1.sin() * dec2.cos() * d_ra.cos();
    y.atan2(x).to_degrees()
}

/// Great-circle angle between two sky positions, in radians.
pub fn ang_dist(ra1: Hour, dec1: Degree, ra2: Hour, dec2: Degree) -> Radian {
    vector_from_ra_dec(ra1, dec1).angle_with(&vector_from_ra_dec(ra2, dec2))
}

#[cfg(test)]
mod sky_test {
    use super::*;
    use approx::assert_relative_eq;

    const NEW_YEAR_2021: UnixTime = 1_609_459_200.0;

    #[test]
    fn test_sun_position_new_year() {
        let (ra, dec) = sun_position(NEW_YEAR_2021);
        assert!((ra - 18.75).abs() < 0.05, "ra = {ra}");
        assert!((dec + 23.0).abs() < 0.1, "dec = {dec}");
    }

    #[test]
    fn test_sun_near_equinox() {
        // 2021-03-20 09:37 UT
        let (_, dec) = sun_position(1_616_233_020.0);
        assert!(dec.abs() < 0.05, "dec = {dec}");
    }

    #[test]
    fn test_alt_az_zenith_and_pole() {
        let utc = NEW_YEAR_2021;
        let (lat, lng) = (52.2, 0.12);
        let lst = sidereal_time(utc) + lng / 15.0;
        let (alt, _) = alt_az(lst, lat, utc, lat, lng);
        assert_relative_eq!(alt, 90.0, epsilon = 1e-5);

        let (alt, az) = alt_az(0.0, 90.0, utc, lat, lng);
        assert_relative_eq!(alt, lat, epsilon = 1e-9);
        assert!(az < 1e-6 || az > 360.0 - 1e-6);

        // Object on the meridian south of zenith
        let (alt, az) = alt_az(lst, 0.0, utc, lat, lng);
        assert_relative_eq!(alt, 90.0 - lat, epsilon = 1e-9);
        assert_relative_eq!(az, 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_alt_az_east_is_rising() {
        let utc = NEW_YEAR_2021;
        let lst = sidereal_time(utc);
        // Hour angle −6h on the equator: due east on the horizon
        let (alt, az) = alt_az(lst + 6.0, 0.0, utc, 30.0, 0.0);
        assert_relative_eq!(alt, 0.0, epsilon = 1e-9);
        assert_relative_eq!(az, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rise_set_sun_in_cambridge() {
        let (ra, dec) = sun_position(NEW_YEAR_2021 + 43_200.0);
        match rise_culmination_set(ra, dec, NEW_YEAR_2021, 52.2, 0.12, -0.833) {
            RiseSet::Events {
                rise,
                culmination,
                set,
            } => {
                // Sunrise ~08:06, noon ~12:03, sunset ~16:02 UT
                assert!((rise - NEW_YEAR_2021 - 8.1 * 3600.0).abs() < 900.0);
                assert!((culmination - NEW_YEAR_2021 - 12.05 * 3600.0).abs() < 900.0);
                assert!((set - NEW_YEAR_2021 - 16.0 * 3600.0).abs() < 900.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rise_set_sentinels() {
        assert!(matches!(
            rise_culmination_set(0.0, 89.0, NEW_YEAR_2021, 52.0, 0.0, 0.0),
            RiseSet::Circumpolar { .. }
        ));
        assert!(matches!(
            rise_culmination_set(0.0, -80.0, NEW_YEAR_2021, 52.0, 0.0, 0.0),
            RiseSet::NeverRises { .. }
        ));
    }

    #[test]
    fn test_precession_round_trip() {
        let utc = NEW_YEAR_2021;
        let (ra, dec) = j2000_to_epoch(5.5, 34.0, utc);
        // Roughly 50"/yr along the ecliptic for 21 years
        let shift = ang_dist(ra, dec, 5.5, 34.0).to_degrees();
        assert!(shift > 0.2 && shift < 0.4, "shift = {shift}");
        let (ra2, dec2) = epoch_to_j2000(ra, dec, utc);
        assert_relative_eq!(ra2, 5.5, epsilon = 1e-12);
        assert_relative_eq!(dec2, 34.0, epsilon = 1e-12);
    }

    #[test]
    fn test_precession_identity_at_j2000() {
        let m = precession_matrix(crate::constants::UNIX_J2000);
        assert_relative_eq!(m, Matrix3::identity(), epsilon = 1e-15);
    }

    #[test]
    fn test_position_angle() {
        assert_relative_eq!(position_angle(5.0, 10.0, 5.0, 11.0), 0.0, epsilon = 1e-9);
        assert!((position_angle(5.0, 0.0, 5.1, 0.0) - 90.0).abs() < 1e-9);
        assert!((position_angle(5.0, 0.0, 4.9, 0.0) + 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_ang_dist() {
        assert_relative_eq!(ang_dist(0.0, 0.0, 6.0, 0.0), std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(ang_dist(3.0, 90.0, 15.0, 90.0), 0.0, epsilon = 1e-7);
    }
}
