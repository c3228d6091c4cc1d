//! # Time helpers
//!
//! Every instant handled by the crate is a **unix time** in seconds (UTC), see
//! [`UnixTime`]. This module converts between that representation and the
//! astronomical quantities derived from it:
//!
//! - Julian dates and Julian centuries since J2000.0,
//! - Greenwich mean sidereal time ([`sidereal_time`], [`gmst`]),
//! - `noon → noon` observing nights ([`day_noon`], [`nights_in`]),
//! - ISO-8601 rendering through [`hifitime::Epoch`] for log lines ([`iso`]),
//! - cooperative cancellation with a "must stop by" [`Deadline`].
//!
//! Leap seconds are ignored: unix time is treated as a uniform UT scale, which is
//! well below the accuracy budget of the cameras.
use std::time::{SystemTime, UNIX_EPOCH};

use hifitime::Epoch;

use crate::constants::{
    Hour, Radian, UnixTime, DAYS_PER_CENTURY, DPI, JD_UNIX_EPOCH, SECONDS_PER_DAY, UNIX_J2000,
};

/// Julian date of a unix time.
pub fn julian_day(utc: UnixTime) -> f64 {
    utc / SECONDS_PER_DAY + JD_UNIX_EPOCH
}

/// Unix time of a Julian date.
pub fn unix_from_julian_day(jd: f64) -> UnixTime {
    (jd - JD_UNIX_EPOCH) * SECONDS_PER_DAY
}

/// Days elapsed since J2000.0 (2000-01-01 12:00:00).
///
/// Computed directly from the unix time instead of going through the Julian date so
/// that no precision is lost on the large `2.45e6` offset.
#[inline]
pub fn days_since_j2000(utc: UnixTime) -> f64 {
    (utc - UNIX_J2000) / SECONDS_PER_DAY
}

/// Julian centuries elapsed since J2000.0.
#[inline]
pub fn centuries_since_j2000(utc: UnixTime) -> f64 {
    days_since_j2000(utc) / DAYS_PER_CENTURY
}

/// Compute the Greenwich Mean Sidereal Time (GMST) in radians.
///
/// Arguments
/// -----------------
/// * `utc`: unix time (UT).
///
/// Return
/// ----------
/// * GMST angle in radians, normalized to `[0, 2π)`.
///
/// Details
/// ----------
/// Uses the IAU 1982 expression written in days `d` and centuries `T` since J2000.0:
///
/// ```text
/// GMST[deg] = 280.46061837 + 360.98564736629·d + 0.000387933·T² − T³/38710000
/// ```
///
/// See also
/// ------------
/// * [`sidereal_time`] – Same quantity expressed in hours.
pub fn gmst(utc: UnixTime) -> Radian {
    const C0: f64 = 280.460_618_37;
    const C1: f64 = 360.985_647_366_29;
    const C2: f64 = 0.000_387_933;
    const C3: f64 = 38_710_000.0;

    let d = days_since_j2000(utc);
    let t = d / DAYS_PER_CENTURY;

    // Split the linear term so that the whole turns are removed before the
    // conversion to radians.
    let whole_days = d.floor();
    let frac_days = d - whole_days;
    let linear = (C1 * whole_days).rem_euclid(360.0) + C1 * frac_days;

    let gmst_deg = C0 + linear + C2 * t * t - t * t * t / C3;
    gmst_deg.to_radians().rem_euclid(DPI)
}

/// Greenwich mean sidereal time in hours, in `[0, 24)`.
///
/// Arguments
/// -----------------
/// * `utc`: unix time.
///
/// Return
/// ----------
/// * Sidereal time in hours.
pub fn sidereal_time(utc: UnixTime) -> Hour {
    let hours = gmst(utc) * 24.0 / DPI;
    if hours >= 24.0 {
        0.0
    } else {
        hours
    }
}

/// Build a [`hifitime::Epoch`] from a unix time.
pub fn epoch_from_unix(utc: UnixTime) -> Epoch {
    Epoch::from_unix_seconds(utc)
}

/// Render a unix time as an ISO-8601 UTC string, e.g. `2021-01-01T00:00:00 UTC`.
pub fn iso(utc: UnixTime) -> String {
    format!("{}", epoch_from_unix(utc))
}

/// Current wall-clock time as a unix time.
pub fn now() -> UnixTime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Start of the `noon → noon` UTC observing night that contains `utc`.
pub fn day_noon(utc: UnixTime) -> UnixTime {
    let half_day = SECONDS_PER_DAY / 2.0;
    ((utc - half_day) / SECONDS_PER_DAY).floor() * SECONDS_PER_DAY + half_day
}

/// All observing nights `[noon, noon + 24h)` that intersect `[utc_min, utc_max]`.
pub fn nights_in(utc_min: UnixTime, utc_max: UnixTime) -> Vec<(UnixTime, UnixTime)> {
    let mut nights = Vec::new();
    let mut start = day_noon(utc_min);
    while start <= utc_max {
        nights.push((start, start + SECONDS_PER_DAY));
        start += SECONDS_PER_DAY;
    }
    nights
}

/// Cooperative "must stop by" deadline shared by every batch entry point.
///
/// A deadline without a stop time never expires. Components call
/// [`Deadline::expired`] before launching any further expensive unit of work
/// (plate-solver invocation, trajectory fit) and exit cleanly once it returns `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Deadline {
    pub stop_by: Option<UnixTime>,
}

impl Deadline {
    pub fn new(stop_by: Option<UnixTime>) -> Self {
        Deadline { stop_by }
    }

    /// A deadline that never expires.
    pub fn none() -> Self {
        Deadline { stop_by: None }
    }

    pub fn expired(&self) -> bool {
        self.expired_at(now())
    }

    pub fn expired_at(&self, utc: UnixTime) -> bool {
        self.stop_by.is_some_and(|stop_by| utc >= stop_by)
    }
}
