//! # Constants and type definitions for Pi Gazing
//!
//! This module centralizes the **physical constants**, **conversion factors**, and **common type
//! aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Geophysical and astronomical constants (spherical Earth, sidereal day, J2000)
//! - Unit conversions (degrees ↔ radians, hours ↔ radians)
//! - Core type aliases used to tag the unit of a bare `f64`
//! - Fixed thresholds shared by several components
//!
//! Tunable thresholds live in [`crate::config`]; only values that are part of
//! the data model or of a published algorithm are defined here.

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Length of the sidereal day in seconds
pub const SIDEREAL_DAY: f64 = 86_164.0905;

/// Ratio of the sidereal rotation rate to the solar one
pub const SIDEREAL_RATE: f64 = 1.002_737_909_35;

/// Mean radius of the spherical Earth model, in meters
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Julian date of the J2000.0 epoch (2000-01-01 12:00:00)
pub const JD_J2000: f64 = 2_451_545.0;

/// Julian date of the unix epoch (1970-01-01 00:00:00 UTC)
pub const JD_UNIX_EPOCH: f64 = 2_440_587.5;

/// Unix time of the J2000.0 epoch
pub const UNIX_J2000: f64 = 946_728_000.0;

/// Number of days in a Julian century
pub const DAYS_PER_CENTURY: f64 = 36_525.0;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Hours → radians
pub const RADH: f64 = DPI / 24.0;

/// Faintest magnitude kept from the Hipparcos catalogue
pub const HIPPARCOS_MAG_LIMIT: f64 = 5.5;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Right ascension in hours
pub type Hour = f64;
/// Distance in meters
pub type Meter = f64;
/// Seconds since 1970-01-01 00:00:00 UTC
pub type UnixTime = f64;
/// Length measured in pixels
pub type PixelDistance = f64;

/// Public identifier of an observatory (e.g. `"eddington0"`)
pub type ObservatoryId = String;
/// Public identifier of an observation (e.g. `"20210101003015_eddington0"`)
pub type ObservationId = String;
/// Public identifier of an observation group
pub type GroupId = String;

/// Hash map keyed with the `ahash` hasher
pub type FastHashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Wrap an angle in radians into `[0, 2π)`.
#[inline]
pub fn wrap_2pi(angle: Radian) -> Radian {
    let wrapped = angle.rem_euclid(DPI);
    if wrapped >= DPI {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle in radians into `(-π, π]`.
#[inline]
pub fn wrap_pi(angle: Radian) -> Radian {
    let wrapped = wrap_2pi(angle);
    if wrapped > std::f64::consts::PI {
        wrapped - DPI
    } else {
        wrapped
    }
}

/// Wrap an angle in degrees into `[0, 360)`.
#[inline]
pub fn wrap_360(angle: Degree) -> Degree {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap a right ascension in hours into `[0, 24)`.
#[inline]
pub fn wrap_24(hours: Hour) -> Hour {
    let wrapped = hours.rem_euclid(24.0);
    if wrapped >= 24.0 {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod constants_test {
    use super::*;

    #[test]
    fn test_wrap_helpers() {
        assert_eq!(wrap_360(-10.0), 350.0);
        assert_eq!(wrap_360(720.0), 0.0);
        assert_eq!(wrap_24(-1.0), 23.0);
        assert!((wrap_pi(3.0 * std::f64::consts::PI) - std::f64::consts::PI).abs() < 1e-12);
        assert!((wrap_2pi(-0.5) - (DPI - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_j2000_consistency() {
        let jd = UNIX_J2000 / SECONDS_PER_DAY + JD_UNIX_EPOCH;
        assert_eq!(jd, JD_J2000);
    }
}
