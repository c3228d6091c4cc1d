//! Linear interpolation of a catalogued track.
use serde::{Deserialize, Serialize};

use crate::constants::{wrap_360, Degree, Meter, UnixTime};
use crate::geometry::earth::point_from_lat_lng;
use crate::geometry::Point;

/// Position of a tracked object at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub utc: UnixTime,
    pub lat: Degree,
    pub lng: Degree,
    pub altitude: Meter,
    /// Ground or orbital speed, meters per second
    pub speed: f64,
}

impl TrackPoint {
    /// Earth-fixed position.
    pub fn position(&self) -> Point {
        point_from_lat_lng(self.lat, self.lng, self.altitude, None)
    }
}

/// Time-ordered positions of one object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    points: Vec<TrackPoint>,
}

fn lerp(a: f64, b: f64, f: f64) -> f64 {
    a + (b - a) * f
}

impl Track {
    /// Build a track, sorting the points by time and dropping repeated instants.
    pub fn new(mut points: Vec<TrackPoint>) -> Self {
        points.sort_by(|a, b| a.utc.total_cmp(&b.utc));
        points.dedup_by(|b, a| a.utc == b.utc);
        Track { points }
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Time span covered, `None` for an empty track.
    pub fn span(&self) -> Option<(UnixTime, UnixTime)> {
        Some((self.points.first()?.utc, self.points.last()?.utc))
    }

    /// Whether the track has a point in `[utc_min, utc_max]` or spans across it.
    pub fn overlaps(&self, utc_min: UnixTime, utc_max: UnixTime) -> bool {
        self.span()
            .is_some_and(|(start, end)| start <= utc_max && end >= utc_min)
    }

    /// Interpolated position at `utc`, `None` outside the track span.
    ///
    /// Longitudes are interpolated across the antimeridian along the short way.
    pub fn at(&self, utc: UnixTime) -> Option<TrackPoint> {
        let (start, end) = self.span()?;
        if !(start..=end).contains(&utc) {
            return None;
        }
        let i = self.points.partition_point(|p| p.utc <= utc);
        if i == self.points.len() {
            return self.points.last().copied();
        }
        let (a, b) = (&self.points[i - 1], &self.points[i]);
        let f = (utc - a.utc) / (b.utc - a.utc);
        let mut d_lng = wrap_360(b.lng - a.lng);
        if d_lng > 180.0 {
            d_lng -= 360.0;
        }
        Some(TrackPoint {
            utc,
            lat: lerp(a.lat, b.lat, f),
            lng: wrap_360(a.lng + d_lng * f),
            altitude: lerp(a.altitude, b.altitude, f),
            speed: lerp(a.speed, b.speed, f),
        })
    }
}

#[cfg(test)]
mod interpolate_test {
    use super::*;

    fn point(utc: f64, lat: f64, lng: f64) -> TrackPoint {
        TrackPoint {
            utc,
            lat,
            lng,
            altitude: 10_000.0,
            speed: 200.0,
        }
    }

    #[test]
    fn test_interpolation() {
        let track = Track::new(vec![point(10.0, 52.0, 1.0), point(0.0, 50.0, 0.0)]);
        let mid = track.at(5.0).unwrap();
        assert_eq!(mid.lat, 51.0);
        assert_eq!(mid.lng, 0.5);
        assert_eq!(track.at(10.0).unwrap().lat, 52.0);
        assert_eq!(track.at(0.0).unwrap().lat, 50.0);
        assert!(track.at(10.5).is_none());
        assert!(track.at(-0.5).is_none());
    }

    #[test]
    fn test_antimeridian() {
        let track = Track::new(vec![point(0.0, 0.0, 359.0), point(2.0, 0.0, 1.0)]);
        assert!((track.at(1.0).unwrap().lng - 0.0).abs() < 1e-9 || (track.at(1.0).unwrap().lng - 360.0).abs() < 1e-9);
        assert!((track.at(0.5).unwrap().lng - 359.5).abs() < 1e-9);
    }

    #[test]
    fn test_overlaps() {
        let track = Track::new(vec![point(0.0, 0.0, 0.0), point(60.0, 0.0, 1.0)]);
        assert!(track.overlaps(50.0, 100.0));
        assert!(track.overlaps(-10.0, 0.0));
        assert!(!track.overlaps(61.0, 100.0));
        assert!(!Track::default().overlaps(0.0, 1.0));
    }
}
