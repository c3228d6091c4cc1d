//! Straight-line trajectory through a set of sight lines.
//!
//! The trajectory is `P(τ) = seed + a + b·τ` with `τ = 0` at the earliest
//! sight line and `τ = 1` at the latest; the six unknowns `(a, b)` are in
//! kilometres so that the simplex steps of all axes are comparable. The seed is
//! the centroid of the observing stations raised to a fixed altitude, where
//! meteors and aircraft are found, so an all-zero start is already near.
//!
//! The objective is the sum over sight lines of the squared angle between the
//! observed direction and the direction from the station to `P(τᵢ)`.
use crate::config::TriangulationConfig;
use crate::constants::{Degree, UnixTime};
use crate::geometry::earth::{point_from_lat_lng, point_to_lat_lng};
use crate::geometry::{Line, Point, Vector};
use crate::optimize::NelderMead;

use super::sight_line::SightLine;

const KM: f64 = 1_000.0;

/// Result of a trajectory fit.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryFit {
    /// Earth-fixed line in meters, parameter 0 at `utc_start` and 1 at `utc_end`
    pub line: Line,
    pub utc_start: UnixTime,
    pub utc_end: UnixTime,
    /// Angle between each sight line and the fitted trajectory, same order as the input
    pub residuals: Vec<Degree>,
    pub iterations: usize,
    pub converged: bool,
}

impl TrajectoryFit {
    pub fn max_residual(&self) -> Degree {
        self.residuals.iter().copied().fold(0.0, f64::max)
    }

    /// Position on the trajectory at `utc`.
    pub fn position_at(&self, utc: UnixTime) -> Point {
        self.line
            .point_at(time_parameter(utc, self.utc_start, self.utc_end))
    }
}

fn time_parameter(utc: UnixTime, utc_start: UnixTime, utc_end: UnixTime) -> f64 {
    if utc_end > utc_start {
        (utc - utc_start) / (utc_end - utc_start)
    } else {
        0.0
    }
}

/// Station centroid raised to `altitude` above the spherical Earth.
pub fn seed_point(sight_lines: &[SightLine], altitude: f64) -> Option<Point> {
    let centroid = Point::centroid(sight_lines.iter().map(|s| &s.line.origin))?;
    let (lat, lng, _) = point_to_lat_lng(&centroid, None);
    Some(point_from_lat_lng(lat, lng, altitude, None))
}

fn trajectory(seed: &Point, x: &[f64]) -> Line {
    Line::new(
        *seed + Vector::new(x[0], x[1], x[2]) * KM,
        Vector::new(x[3], x[4], x[5]) * KM,
    )
}

fn angle_to(sight_line: &SightLine, target: &Point) -> f64 {
    sight_line.line.direction.angle_with(&(*target - sight_line.line.origin))
}

/// Fit a straight trajectory to `sight_lines`.
///
/// Return
/// ----------
/// * The fit, or `None` when there is no sight line.
pub fn fit_trajectory(sight_lines: &[SightLine], config: &TriangulationConfig) -> Option<TrajectoryFit> {
    let seed = seed_point(sight_lines, config.seed_altitude)?;
    let utc_start = sight_lines.iter().map(|s| s.utc).fold(f64::INFINITY, f64::min);
    let utc_end = sight_lines.iter().map(|s| s.utc).fold(f64::NEG_INFINITY, f64::max);
    let taus: Vec<f64> = sight_lines
        .iter()
        .map(|s| time_parameter(s.utc, utc_start, utc_end))
        .collect();

    let objective = |x: &[f64]| -> f64 {
        let line = trajectory(&seed, x);
        sight_lines
            .iter()
            .zip(&taus)
            .map(|(s, &tau)| angle_to(s, &line.point_at(tau)).powi(2))
            .sum()
    };

    let step = config.seed_step / KM;
    let minimum = NelderMead::new(vec![step; 6])
        .with_xatol(1e-7)
        .with_fatol(1e-18)
        .with_max_iterations(config.max_iterations)
        .minimize(objective, &[0.0; 6]);

    let line = trajectory(&seed, &minimum.x);
    let residuals = sight_lines
        .iter()
        .zip(&taus)
        .map(|(s, &tau)| angle_to(s, &line.point_at(tau)).to_degrees())
        .collect();
    Some(TrajectoryFit {
        line,
        utc_start,
        utc_end,
        residuals,
        iterations: minimum.iterations,
        converged: minimum.converged,
    })
}

#[cfg(test)]
mod fit_test {
    use super::*;
    use crate::frames::GeodeticPosition;

    fn synthetic(stations: &[(f64, f64)], p1: Point, p2: Point, count: usize) -> Vec<SightLine> {
        (0..count)
            .map(|i| {
                let (lat, lng) = stations[i % stations.len()];
                let station = point_from_lat_lng(lat, lng, 0.0, None);
                let tau = i as f64 / (count - 1) as f64;
                let target = p1 + (p2 - p1) * tau;
                SightLine {
                    observation: format!("obs{}", i % stations.len()),
                    observatory: format!("st{}", i % stations.len()),
                    utc: 1_000.0 + 2.0 * tau,
                    site: GeodeticPosition::new(lat, lng, 0.0),
                    line: Line::new(station, (target - station).normalize().unwrap()),
                    alt: 0.0,
                    az: 0.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_recovers_synthetic_meteor() {
        let p1 = point_from_lat_lng(52.0, 0.0, 80_000.0, None);
        let p2 = point_from_lat_lng(52.1, 0.2, 70_000.0, None);
        let stations = [(51.6, -0.4), (51.6, 0.33), (52.05, -0.05)];
        let lines = synthetic(&stations, p1, p2, 10);
        let fit = fit_trajectory(&lines, &TriangulationConfig::default()).unwrap();
        assert!(fit.max_residual() < 0.1, "residual {}", fit.max_residual());
        assert!(fit.line.point_at(0.0).distance_to(&p1) < 2_000.0);
        assert!(fit.line.point_at(1.0).distance_to(&p2) < 2_000.0);
        assert_eq!(fit.position_at(1_002.0), fit.line.point_at(1.0));
    }

    #[test]
    fn test_no_sight_lines() {
        assert!(fit_trajectory(&[], &TriangulationConfig::default()).is_none());
    }

    #[test]
    fn test_seed_above_centroid() {
        let p = point_from_lat_lng(52.0, 0.0, 80_000.0, None);
        let lines = synthetic(&[(52.0, 0.0)], p, p, 2);
        let seed = seed_point(&lines, 20_000.0).unwrap();
        let (lat, lng, alt) = point_to_lat_lng(&seed, None);
        assert!((lat - 52.0).abs() < 1e-9);
        assert!(lng.abs() < 1e-9);
        assert!((alt - 20_000.0).abs() < 1e-6);
    }
}
