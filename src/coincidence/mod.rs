//! # Multi-station coincidence grouping
//!
//! Moving-object detections recorded by different observatories at the same
//! time probably show the same event. They are gathered into
//! [`ObservationGroup`]s of type [`SIMULTANEOUS_DETECTION`] which the
//! triangulation works on.
//!
//! ## Algorithm
//!
//! Detections are sorted by start time (then id). Each detection not yet
//! grouped seeds a group whose interval is its own `[start, end]`. The group
//! then grows: any ungrouped detection of the same category whose interval
//! overlaps the group interval widened by `match_margin` on each side joins,
//! and the group interval becomes the union. Growth repeats until a pass adds
//! nobody. Only detections starting within `search_margin` of the interval
//! are examined.
//!
//! A group is kept when it spans at least `min_observatories` stations and
//! its two most distant stations are at least `min_baseline` apart.
use std::collections::BTreeSet;

use itertools::Itertools;
use log::{debug, info};
use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::config::CoincidenceConfig;
use crate::constants::{Meter, ObservationId, ObservatoryId, UnixTime};
use crate::frames::GeodeticPosition;
use crate::geometry::earth::great_circle_distance;
use crate::logging::OutcomeCounters;
use crate::pigazing_errors::PiGazingError;
use crate::store::{
    Category, Observation, ObservationGroup, ObservationKind, ObservationQuery, ObservationStore,
    SIMULTANEOUS_DETECTION,
};
use crate::time::Deadline;

/// The part of a moving-object observation the grouper looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub id: ObservationId,
    pub observatory: ObservatoryId,
    pub start: UnixTime,
    pub end: UnixTime,
    pub category: Category,
}

impl From<&Observation> for Detection {
    fn from(o: &Observation) -> Self {
        Detection {
            id: o.id.clone(),
            observatory: o.observatory.clone(),
            start: o.utc,
            end: o.utc_end(),
            category: o.category,
        }
    }
}

/// Indices of the detections of one group; most groups hold two or three.
pub type GroupIndices = SmallVec<[usize; 4]>;

/// Group detections that overlap in time.
///
/// Return
/// ----------
/// * Groups as indices into `detections`, each group in start-time order.
///   Every detection appears in exactly one group, singletons included.
pub fn group_detections(detections: &[Detection], config: &CoincidenceConfig) -> Vec<GroupIndices> {
    let order: Vec<usize> = (0..detections.len())
        .sorted_by_key(|&i| (OrderedFloat(detections[i].start), &detections[i].id))
        .collect();
    let starts: Vec<UnixTime> = order.iter().map(|&i| detections[i].start).collect();
    let longest = detections
        .iter()
        .map(|d| d.end - d.start)
        .fold(0.0, f64::max);

    let mut grouped = vec![false; order.len()];
    let mut groups = Vec::new();
    for seed in 0..order.len() {
        if grouped[seed] {
            continue;
        }
        grouped[seed] = true;
        let seed_detection = &detections[order[seed]];
        let mut members: GroupIndices = smallvec::smallvec![seed];
        let (mut lo, mut hi) = (seed_detection.start, seed_detection.end);

        loop {
            let mut added = false;
            // A detection reaching the interval started at most `longest` before it
            let first = starts.partition_point(|&s| s < lo - config.search_margin - longest);
            let last = starts.partition_point(|&s| s <= hi + config.search_margin);
            for k in first..last {
                if grouped[k] {
                    continue;
                }
                let c = &detections[order[k]];
                if c.category != seed_detection.category {
                    continue;
                }
                let overlaps = c.start <= hi + config.match_margin && c.end >= lo - config.match_margin;
                if overlaps {
                    grouped[k] = true;
                    members.push(k);
                    lo = lo.min(c.start);
                    hi = hi.max(c.end);
                    added = true;
                }
            }
            if !added {
                break;
            }
        }
        members.sort_unstable();
        groups.push(members.into_iter().map(|k| order[k]).collect());
    }
    groups
}

/// Largest great-circle distance between any two positions.
pub fn max_baseline(positions: &[GeodeticPosition]) -> Meter {
    positions
        .iter()
        .tuple_combinations()
        .map(|(a, b)| great_circle_distance(a.lat, a.lng, b.lat, b.lng))
        .fold(0.0, f64::max)
}

/// Id of the group seeded by `first_member`.
pub fn group_id(first_member: &str) -> String {
    format!("grp_{first_member}")
}

/// Options of `search_simultaneous_detections`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoincidenceRun {
    pub utc_min: UnixTime,
    pub utc_max: UnixTime,
    /// Keep only groups this observatory takes part in
    pub observatory: Option<ObservatoryId>,
    pub flush: bool,
    pub deadline: Deadline,
}

/// Group the moving-object detections of a window and persist the groups.
///
/// Detections already in a group are left out, so reruns over a sliding
/// window only group what is new. With `flush`, groups of the window are
/// deleted first.
pub fn search_simultaneous_detections<S: ObservationStore + ?Sized>(
    store: &mut S,
    config: &CoincidenceConfig,
    run: &CoincidenceRun,
) -> Result<OutcomeCounters, PiGazingError> {
    let mut counters = OutcomeCounters::new("search_simultaneous_detections");
    if run.flush {
        let n = store.delete_groups(SIMULTANEOUS_DETECTION, run.utc_min, run.utc_max)?;
        store.commit()?;
        info!("flushed {n} group(s)");
    }

    // Groups reaching into the window may hold detections of the window
    let already: BTreeSet<ObservationId> = store
        .groups(
            SIMULTANEOUS_DETECTION,
            run.utc_min - config.search_margin,
            run.utc_max + config.search_margin,
        )?
        .into_iter()
        .flat_map(|g| g.members)
        .collect();

    let observations =
        store.search_observations(&ObservationQuery::window(run.utc_min, run.utc_max).kind(ObservationKind::MovingObject))?;
    let detections: Vec<Detection> = observations
        .iter()
        .filter(|o| !already.contains(&o.id))
        .map(Detection::from)
        .collect();
    counters.add("already_grouped", observations.len() - detections.len());

    for members in group_detections(&detections, config) {
        if run.deadline.expired() {
            counters.increment("deadline");
            break;
        }
        let members: Vec<&Detection> = members.iter().map(|&i| &detections[i]).collect();
        let observatories: Vec<ObservatoryId> = members
            .iter()
            .map(|d| d.observatory.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if observatories.len() < config.min_observatories {
            counters.increment("single_station");
            continue;
        }
        if let Some(only) = &run.observatory {
            if !observatories.contains(only) {
                continue;
            }
        }

        let utc_start = members[0].start;
        let mut positions = Vec::with_capacity(observatories.len());
        for id in &observatories {
            let observatory = store.observatory(id)?;
            let status = store.observatory_status(id, utc_start)?;
            positions.push(status.position(&observatory));
        }
        let baseline = max_baseline(&positions);
        if baseline < config.min_baseline {
            debug!("{}: baseline {baseline:.0} m too short", members[0].id);
            counters.increment("short_baseline");
            continue;
        }

        let utc_end = members.iter().map(|d| d.end).fold(utc_start, f64::max);
        let last_start = members.iter().map(|d| d.start).fold(utc_start, f64::max);
        let group = ObservationGroup {
            id: group_id(&members[0].id),
            semantic_type: SIMULTANEOUS_DETECTION.into(),
            category: members[0].category,
            members: members.iter().map(|d| d.id.clone()).collect(),
            observatories,
            utc_start,
            utc_end,
            time_spread: last_start - utc_start,
            max_baseline: baseline,
            status: None,
            trajectory: None,
        };
        debug!(
            "{}: {} member(s), baseline {:.1} km",
            group.id,
            group.members.len(),
            baseline / 1_000.0
        );
        store.create_group(group)?;
        counters.increment("groups");
    }
    store.commit()?;
    counters.log_summary();
    Ok(counters)
}
