//! # Aircraft and satellite identification
//!
//! Matches the sight lines of a moving-object observation against catalogued
//! tracks: ADS-B records for aircraft ([`aircraft`]) and propagated element
//! sets for satellites ([`satellite`]).
//!
//! Each candidate gets a clock offset `c`, bounded by `±max_clock_offset`, that
//! minimises the angle between the first sight line and the track position at
//! `t₀ + c`, weighted by `exp(c / clock_offset_scale)`. With that offset the
//! angle is averaged over every sight line. Candidates whose mean angle stays
//! within `max_angular_offset` are scored by `hypot(mean angle°, c)`; the lowest
//! score wins. Without any such candidate the observation is recorded as
//! [`UNIDENTIFIED`].
pub mod aircraft;
pub mod interpolate;
pub mod satellite;

use log::{debug, info};

use crate::catalogs::LensCatalogue;
use crate::config::IdentificationConfig;
use crate::constants::{Degree, Meter, ObservatoryId, UnixTime};
use crate::frames::{EarthCentred, GeodeticPosition};
use crate::logging::OutcomeCounters;
use crate::optimize::minimize_bounded;
use crate::pigazing_errors::PiGazingError;
use crate::store::{
    Category, IdentificationField, MetaKey, MetaValue, ObservationKind, ObservationQuery,
    ObservationStore, TrackKind,
};
use crate::time::Deadline;
use crate::triangulation::{observation_sight_lines, SightLine};

pub use aircraft::AdsbRecords;
pub use interpolate::{Track, TrackPoint};
pub use satellite::{Satellite, SatelliteCatalogue};

/// Designation recorded when no candidate matches.
pub const UNIDENTIFIED: &str = "Unidentified";

/// A catalogued object that may have been observed.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTrack {
    pub kind: TrackKind,
    /// Call-sign or satellite name
    pub designation: String,
    /// ADS-B hex ident or NORAD number
    pub ident: String,
    pub operator: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub track: Track,
}

/// Provider of candidate tracks for a time window.
pub trait TrackSource {
    fn kind(&self) -> TrackKind;

    /// Candidates with positions in `[utc_min, utc_max]`.
    fn candidates(&self, utc_min: UnixTime, utc_max: UnixTime) -> Result<Vec<CandidateTrack>, PiGazingError>;
}

/// Agreement of one candidate with the observed sight lines.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    /// Seconds added to the observation time to reach the track
    pub clock_offset: f64,
    /// Mean angle between sight lines and the track
    pub angular_offset: Degree,
    /// Mean distance from the station to the track
    pub distance: Meter,
    pub mean_altitude: Meter,
    pub path_start: GeodeticPosition,
    pub path_end: GeodeticPosition,
}

impl CandidateMatch {
    pub fn score(&self) -> f64 {
        self.angular_offset.hypot(self.clock_offset)
    }
}

/// Outcome of the identification of one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    Identified {
        candidate: CandidateTrack,
        fit: CandidateMatch,
    },
    Unidentified,
}

impl Identification {
    pub fn designation(&self) -> &str {
        match self {
            Identification::Identified { candidate, .. } => &candidate.designation,
            Identification::Unidentified => UNIDENTIFIED,
        }
    }
}

fn angle_to_track(sight_line: &SightLine, track: &Track, utc: UnixTime) -> Option<(Degree, TrackPoint)> {
    let point = track.at(utc)?;
    let to_track = point.position() - sight_line.station();
    Some((sight_line.line.direction.angle_with(&to_track).to_degrees(), point))
}

/// Fit the clock offset of one candidate and measure its agreement.
///
/// Arguments
/// -----------------
/// * `sight_lines`: observed sight lines in time order, not empty.
/// * `candidate`: the catalogued track.
/// * `config`: offset bounds and weighting.
///
/// Return
/// ----------
/// * `None` when the track does not cover the sight lines at the fitted offset.
pub fn match_candidate(
    sight_lines: &[SightLine],
    candidate: &CandidateTrack,
    config: &IdentificationConfig,
) -> Option<CandidateMatch> {
    let first = sight_lines.first()?;
    let last = sight_lines.last()?;
    let objective = |c: f64| {
        angle_to_track(first, &candidate.track, first.utc + c)
            .map_or(f64::NAN, |(angle, _)| angle * (c / config.clock_offset_scale).exp())
    };
    let (clock_offset, value) = minimize_bounded(
        objective,
        -config.max_clock_offset,
        config.max_clock_offset,
        config.clock_offset_grid,
    );
    if !value.is_finite() {
        return None;
    }

    let samples: Vec<(Degree, TrackPoint, Meter)> = sight_lines
        .iter()
        .filter_map(|s| {
            let (angle, point) = angle_to_track(s, &candidate.track, s.utc + clock_offset)?;
            Some((angle, point, point.position().distance_to(&s.station())))
        })
        .collect();
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let position = |utc: UnixTime| {
        candidate
            .track
            .at(utc)
            .map(|p| EarthCentred(p.position()).to_geodetic(None))
    };
    Some(CandidateMatch {
        clock_offset,
        angular_offset: samples.iter().map(|s| s.0).sum::<f64>() / n,
        distance: samples.iter().map(|s| s.2).sum::<f64>() / n,
        mean_altitude: samples.iter().map(|s| s.1.altitude).sum::<f64>() / n,
        path_start: position(first.utc + clock_offset)?,
        path_end: position(last.utc + clock_offset)?,
    })
}

/// Best candidate for the observed sight lines.
pub fn identify(
    sight_lines: &[SightLine],
    candidates: Vec<CandidateTrack>,
    config: &IdentificationConfig,
) -> Identification {
    let mut best: Option<(f64, CandidateTrack, CandidateMatch)> = None;
    for candidate in candidates {
        let Some(fit) = match_candidate(sight_lines, &candidate, config) else {
            continue;
        };
        if fit.angular_offset > config.max_angular_offset {
            continue;
        }
        let score = fit.score();
        debug!(
            "{}: offset {:.2}°, clock {:+.1} s, score {score:.2}",
            candidate.designation, fit.angular_offset, fit.clock_offset
        );
        if best.as_ref().map_or(true, |b| score < b.0) {
            best = Some((score, candidate, fit));
        }
    }
    match best {
        Some((_, candidate, fit)) => Identification::Identified { candidate, fit },
        None => Identification::Unidentified,
    }
}

fn position_value(p: &GeodeticPosition) -> Result<MetaValue, PiGazingError> {
    Ok(MetaValue::from(serde_json::to_string(&[p.lat, p.lng, p.alt])?))
}

/// Write an identification as observation metadata under the keys of `kind`.
pub fn record_identification<S: ObservationStore + ?Sized>(
    store: &mut S,
    observation: &str,
    kind: TrackKind,
    identification: &Identification,
) -> Result<(), PiGazingError> {
    let key = |field| MetaKey::Identification(kind, field);
    store.set_observation_metadata(
        observation,
        key(IdentificationField::Designation),
        identification.designation().into(),
    )?;
    let Identification::Identified { candidate, fit } = identification else {
        return Ok(());
    };
    let mut values = vec![
        (IdentificationField::Ident, MetaValue::from(candidate.ident.as_str())),
        (IdentificationField::ClockOffset, fit.clock_offset.into()),
        (IdentificationField::AngularOffset, fit.angular_offset.into()),
        (IdentificationField::Distance, fit.distance.into()),
        (IdentificationField::MeanAltitude, fit.mean_altitude.into()),
        (IdentificationField::PathStart, position_value(&fit.path_start)?),
        (IdentificationField::PathEnd, position_value(&fit.path_end)?),
    ];
    for (field, text) in [
        (IdentificationField::Operator, &candidate.operator),
        (IdentificationField::Model, &candidate.model),
        (IdentificationField::Manufacturer, &candidate.manufacturer),
    ] {
        if let Some(text) = text {
            values.push((field, text.as_str().into()));
        }
    }
    for (field, value) in values {
        store.set_observation_metadata(observation, key(field), value)?;
    }
    Ok(())
}

/// Options of the identification entry points.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationRun {
    pub utc_min: UnixTime,
    pub utc_max: UnixTime,
    pub observatory: Option<ObservatoryId>,
    pub flush: bool,
    pub deadline: Deadline,
}

fn category_of(kind: TrackKind) -> Category {
    match kind {
        TrackKind::Plane => Category::Plane,
        TrackKind::Satellite => Category::Satellite,
    }
}

/// Identify the moving objects of the window whose category matches the source.
///
/// Observations already carrying a designation are skipped unless flushed.
pub fn identify_observations<S: ObservationStore + ?Sized>(
    store: &mut S,
    source: &dyn TrackSource,
    lenses: &LensCatalogue,
    config: &IdentificationConfig,
    run: &IdentificationRun,
) -> Result<OutcomeCounters, PiGazingError> {
    let kind = source.kind();
    let mut counters = OutcomeCounters::new(format!("{}_identification", kind.prefix()));
    let query = ObservationQuery::window(run.utc_min, run.utc_max)
        .kind(ObservationKind::MovingObject)
        .category(category_of(kind))
        .observatory(run.observatory.as_deref());
    let designation = MetaKey::Identification(kind, IdentificationField::Designation);

    if run.flush {
        let mut flushed = 0;
        for observation in store.search_observations(&query)? {
            let mut removed = false;
            for key in MetaKey::identification_keys(kind) {
                removed |= store.delete_observation_metadata(&observation.id, &key)?;
            }
            flushed += usize::from(removed);
        }
        store.commit()?;
        info!("flushed {flushed} {} identification(s)", kind.prefix());
    }

    for observation in store.search_observations(&query)? {
        if observation.meta(&designation).is_some() {
            counters.increment("already_identified");
            continue;
        }
        if run.deadline.expired() {
            counters.increment("deadline");
            break;
        }
        let sight_lines =
            match observation_sight_lines(store, &observation, lenses, config.max_samples_per_observation) {
                Ok((lines, rescued)) => {
                    if rescued {
                        counters.increment("rescued");
                    }
                    lines
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    counters.item_failed(&observation.id, observation.utc, &e);
                    continue;
                }
            };
        if sight_lines.is_empty() {
            counters.increment("no_sight_lines");
            continue;
        }

        let candidates = source.candidates(
            observation.utc - config.track_padding,
            observation.utc_end() + config.track_padding,
        )?;
        let identification = identify(&sight_lines, candidates, config);
        info!("{}: {}", observation.id, identification.designation());
        record_identification(store, &observation.id, kind, &identification)?;
        store.commit()?;
        counters.increment(match identification {
            Identification::Identified { .. } => "identified",
            Identification::Unidentified => "unidentified",
        });
    }
    counters.log_summary();
    Ok(counters)
}

/// Identify aircraft from ADS-B records.
pub fn plane_identification<S: ObservationStore + ?Sized>(
    store: &mut S,
    adsb: &AdsbRecords,
    lenses: &LensCatalogue,
    config: &IdentificationConfig,
    run: &IdentificationRun,
) -> Result<OutcomeCounters, PiGazingError> {
    identify_observations(store, adsb, lenses, config, run)
}

/// Identify satellites from propagated element sets.
pub fn satellite_identification<S: ObservationStore + ?Sized>(
    store: &mut S,
    satellites: &SatelliteCatalogue,
    lenses: &LensCatalogue,
    config: &IdentificationConfig,
    run: &IdentificationRun,
) -> Result<OutcomeCounters, PiGazingError> {
    identify_observations(store, satellites, lenses, config, run)
}
