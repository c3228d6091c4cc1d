//! # Trajectory triangulation
//!
//! Fits a straight-line trajectory to each group of simultaneous detections.
//!
//! For every member observation the recorded pixel path is decoded
//! ([`path`]), sampled and turned into Earth-fixed sight lines using the
//! camera orientation effective at the observation time ([`sight_line`]).
//! A line is then fitted through the sight lines ([`fit`]).
//!
//! A group is only triangulated with enough sight lines and a long enough
//! baseline between the contributing stations, and the fit is kept only if
//! no sight line misses it by more than the residual threshold. The outcome
//! is stored on the group either way, so reruns skip groups already handled
//! until the window is flushed.
pub mod fit;
pub mod path;
pub mod sight_line;

use std::collections::BTreeMap;

use log::{debug, info};

use crate::catalogs::LensCatalogue;
use crate::coincidence::max_baseline;
use crate::config::TriangulationConfig;
use crate::constants::{wrap_24, ObservatoryId, UnixTime};
use crate::frames::{EarthCentred, GeodeticPosition};
use crate::geometry::earth::vector_to_ra_dec;
use crate::logging::OutcomeCounters;
use crate::pigazing_errors::PiGazingError;
use crate::store::{
    ObservationGroup, ObservationStore, TrajectoryRecord, TriangulationStatus,
    SIMULTANEOUS_DETECTION,
};
use crate::time::{sidereal_time, Deadline};

pub use fit::{fit_trajectory, TrajectoryFit};
pub use path::{decode_path, DecodedPath, PathPoint};
pub use sight_line::{observation_sight_lines, SightLine, StationCamera};

/// Outcome of the triangulation of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTriangulation {
    pub status: TriangulationStatus,
    pub trajectory: Option<TrajectoryRecord>,
}

impl GroupTriangulation {
    fn rejected(status: TriangulationStatus) -> Self {
        GroupTriangulation {
            status,
            trajectory: None,
        }
    }
}

/// Trajectory record of a fit, with the quantities derived from it.
pub fn trajectory_record(fit: &TrajectoryFit, sight_lines: &[SightLine], baseline: f64) -> TrajectoryRecord {
    let start = EarthCentred(fit.line.point_at(0.0)).to_geodetic(None);
    let end = EarthCentred(fit.line.point_at(1.0)).to_geodetic(None);
    let duration = fit.utc_end - fit.utc_start;
    let speed = if duration > 0.0 {
        fit.line.direction.norm() / duration
    } else {
        0.0
    };
    let mean_altitude = sight_lines
        .iter()
        .map(|s| EarthCentred(fit.position_at(s.utc)).to_geodetic(None).alt)
        .sum::<f64>()
        / sight_lines.len().max(1) as f64;

    // The radiant is where the object comes from, opposite to its motion
    let (ra_fixed, radiant_dec) = vector_to_ra_dec(&(-fit.line.direction));
    let midpoint = (fit.utc_start + fit.utc_end) / 2.0;

    TrajectoryRecord {
        line: fit.line,
        utc_start: fit.utc_start,
        utc_end: fit.utc_end,
        start,
        end,
        speed,
        mean_altitude,
        max_residual: fit.max_residual(),
        max_baseline: baseline,
        radiant_ra: wrap_24(ra_fixed + sidereal_time(midpoint)),
        radiant_dec,
        sight_line_count: sight_lines.len(),
    }
}

/// Triangulate a set of sight lines.
///
/// Arguments
/// -----------------
/// * `sight_lines`: sight lines of every member observation.
/// * `config`: preconditions and fit settings.
///
/// Return
/// ----------
/// * The status and, when triangulated, the trajectory.
pub fn triangulate(sight_lines: &[SightLine], config: &TriangulationConfig) -> GroupTriangulation {
    if sight_lines.len() < config.min_sight_lines {
        return GroupTriangulation::rejected(TriangulationStatus::TooFewSightLines);
    }
    let stations: BTreeMap<&ObservatoryId, GeodeticPosition> = sight_lines
        .iter()
        .map(|s| (&s.observatory, s.site))
        .collect();
    let positions: Vec<GeodeticPosition> = stations.into_values().collect();
    let baseline = max_baseline(&positions);
    if baseline < config.min_baseline {
        return GroupTriangulation::rejected(TriangulationStatus::BaselineTooShort);
    }

    let Some(fit) = fit_trajectory(sight_lines, config) else {
        return GroupTriangulation::rejected(TriangulationStatus::TooFewSightLines);
    };
    if !fit.converged {
        debug!("trajectory fit stopped after {} iteration(s)", fit.iterations);
    }
    if fit.max_residual() > config.max_residual {
        debug!("max residual {:.2}° too large", fit.max_residual());
        return GroupTriangulation::rejected(TriangulationStatus::ResidualTooLarge);
    }
    GroupTriangulation {
        status: TriangulationStatus::Triangulated,
        trajectory: Some(trajectory_record(&fit, sight_lines, baseline)),
    }
}

/// Collect the sight lines of a group's members.
///
/// Members lacking metadata or with an unreadable path are skipped and counted.
pub fn group_sight_lines<S: ObservationStore + ?Sized>(
    store: &S,
    group: &ObservationGroup,
    lenses: &LensCatalogue,
    config: &TriangulationConfig,
    counters: &mut OutcomeCounters,
) -> Result<Vec<SightLine>, PiGazingError> {
    let mut lines = Vec::new();
    for id in &group.members {
        let observation = match store.observation(id) {
            Ok(o) => o,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                counters.item_failed(id, group.utc_start, &e);
                continue;
            }
        };
        match observation_sight_lines(store, &observation, lenses, config.max_samples_per_observation) {
            Ok((found, rescued)) => {
                if rescued {
                    counters.increment("rescued");
                }
                lines.extend(found);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => counters.item_failed(&observation.id, observation.utc, &e),
        }
    }
    Ok(lines)
}

/// Options of `triangulation`.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulationRun {
    pub utc_min: UnixTime,
    pub utc_max: UnixTime,
    /// Only groups this observatory takes part in
    pub observatory: Option<ObservatoryId>,
    pub flush: bool,
    pub deadline: Deadline,
}

/// Clear the triangulation outcome of every group in the window.
pub fn flush_trajectories<S: ObservationStore + ?Sized>(
    store: &mut S,
    utc_min: UnixTime,
    utc_max: UnixTime,
) -> Result<usize, PiGazingError> {
    let mut flushed = 0;
    for group in store.groups(SIMULTANEOUS_DETECTION, utc_min, utc_max)? {
        if group.status.is_some() || group.trajectory.is_some() {
            store.set_group_trajectory(&group.id, None, None)?;
            flushed += 1;
        }
    }
    Ok(flushed)
}

/// Triangulate every group of the window not handled yet.
///
/// Each group is committed on its own; the deadline is checked before each fit.
pub fn triangulation<S: ObservationStore + ?Sized>(
    store: &mut S,
    lenses: &LensCatalogue,
    config: &TriangulationConfig,
    run: &TriangulationRun,
) -> Result<OutcomeCounters, PiGazingError> {
    let mut counters = OutcomeCounters::new("triangulation");
    if run.flush {
        let n = flush_trajectories(store, run.utc_min, run.utc_max)?;
        store.commit()?;
        info!("flushed {n} trajectory(ies)");
    }

    for group in store.groups(SIMULTANEOUS_DETECTION, run.utc_min, run.utc_max)? {
        if let Some(only) = &run.observatory {
            if !group.observatories.contains(only) {
                continue;
            }
        }
        if group.status.is_some() {
            counters.increment("already_triangulated");
            continue;
        }
        if run.deadline.expired() {
            counters.increment("deadline");
            break;
        }

        let lines = group_sight_lines(store, &group, lenses, config, &mut counters)?;
        let outcome = triangulate(&lines, config);
        match &outcome.trajectory {
            Some(t) => info!(
                "{}: {} sight line(s), {:.1} km/s, {:.1} → {:.1} km, residual {:.3}°",
                group.id,
                t.sight_line_count,
                t.speed / 1_000.0,
                t.start.alt / 1_000.0,
                t.end.alt / 1_000.0,
                t.max_residual
            ),
            None => debug!("{}: {}", group.id, outcome.status.as_str()),
        }
        store.set_group_trajectory(&group.id, Some(outcome.status), outcome.trajectory)?;
        store.commit()?;
        counters.increment(outcome.status.as_str());
    }
    counters.log_summary();
    Ok(counters)
}

#[cfg(test)]
mod triangulation_test {
    use super::*;
    use crate::geometry::earth::point_from_lat_lng;
    use crate::geometry::Line;

    fn sight_line(observatory: &str, lat: f64, lng: f64, target: crate::geometry::Point, utc: f64) -> SightLine {
        let station = point_from_lat_lng(lat, lng, 0.0, None);
        SightLine {
            observation: format!("{observatory}_obs"),
            observatory: observatory.into(),
            utc,
            site: GeodeticPosition::new(lat, lng, 0.0),
            line: Line::new(station, (target - station).normalize().unwrap()),
            alt: 0.0,
            az: 0.0,
        }
    }

    #[test]
    fn test_too_few_sight_lines() {
        let target = point_from_lat_lng(52.0, 0.0, 80_000.0, None);
        let lines: Vec<SightLine> = (0..5)
            .map(|i| sight_line(if i % 2 == 0 { "a" } else { "b" }, 51.6, i as f64 * 0.3, target, i as f64))
            .collect();
        let outcome = triangulate(&lines, &TriangulationConfig::default());
        assert_eq!(outcome.status, TriangulationStatus::TooFewSightLines);
        assert!(outcome.trajectory.is_none());
    }

    #[test]
    fn test_short_baseline() {
        let target = point_from_lat_lng(52.0, 0.0, 80_000.0, None);
        let lines: Vec<SightLine> = (0..8)
            .map(|i| {
                let (name, lng) = if i % 2 == 0 { ("a", 0.0) } else { ("b", 0.005) };
                sight_line(name, 51.6, lng, target, i as f64)
            })
            .collect();
        let outcome = triangulate(&lines, &TriangulationConfig::default());
        assert_eq!(outcome.status, TriangulationStatus::BaselineTooShort);
    }

    #[test]
    fn test_derived_quantities() {
        let p1 = point_from_lat_lng(52.0, 0.0, 80_000.0, None);
        let p2 = point_from_lat_lng(52.1, 0.2, 70_000.0, None);
        let stations = [("a", 51.6, -0.4), ("b", 51.6, 0.33), ("c", 52.05, -0.05)];
        let lines: Vec<SightLine> = (0..12)
            .map(|i| {
                let (name, lat, lng) = stations[i % 3];
                let tau = i as f64 / 11.0;
                sight_line(name, lat, lng, p1 + (p2 - p1) * tau, 500.0 + 2.0 * tau)
            })
            .collect();
        let outcome = triangulate(&lines, &TriangulationConfig::default());
        assert_eq!(outcome.status, TriangulationStatus::Triangulated);
        let t = outcome.trajectory.unwrap();
        assert_eq!(t.sight_line_count, 12);
        assert!((t.speed - p1.distance_to(&p2) / 2.0).abs() < 1_000.0);
        assert!((t.start.alt - 80_000.0).abs() < 2_000.0);
        assert!((t.end.alt - 70_000.0).abs() < 2_000.0);
        assert!(t.mean_altitude > 70_000.0 && t.mean_altitude < 80_000.0);
        assert!(t.max_baseline > 50_000.0);
        assert!((0.0..24.0).contains(&t.radiant_ra));
    }
}
