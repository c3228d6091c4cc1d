//! # Observation and metadata store
//!
//! The pipeline reads observatories, observations and files produced by the
//! camera network and writes back orientation fits, calibration coefficients,
//! observation groups, trajectories and identifications. It does so only through
//! the [`ObservationStore`] trait; the storage medium is an implementation detail.
//!
//! ## Implementations
//!
//! * [`MemoryStore`] – everything in memory, serialisable with serde.
//! * [`ArchiveStore`] – a [`MemoryStore`] persisted as one JSON document and
//!   committed atomically (write to a temporary file, then rename).
//!
//! ## Data model
//!
//! | Entity | Notes |
//! |---|---|
//! | [`Observatory`] | id, name, nominal position, owner |
//! | [`ObservatoryMetadata`] | `(observatory, key, time)` is unique; most recent record `≤ t` is effective at `t` |
//! | [`Observation`] | immutable time and category; metadata map written by the pipeline |
//! | [`FileRecord`] | files attached to an observation, one primary image at most |
//! | [`ObservationGroup`] | simultaneous detections, optional trajectory |
pub mod archive;
pub mod keys;
pub mod memory;
pub mod status;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::constants::{
    Degree, GroupId, Hour, Meter, ObservationId, ObservatoryId, UnixTime,
};
use crate::frames::GeodeticPosition;
use crate::geometry::Line;
use crate::pigazing_errors::PiGazingError;

pub use archive::ArchiveStore;
pub use keys::{BaseMetaKey, IdentificationField, MetaKey, MetaValue, StatusKey, TrackKind};
pub use memory::MemoryStore;
pub use status::{CameraOrientation, ObservatoryStatus};

/// A camera station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observatory {
    pub id: ObservatoryId,
    pub name: String,
    pub lat: Degree,
    pub lng: Degree,
    /// Altitude above the spherical Earth
    pub alt: Meter,
    pub owner: String,
}

impl Observatory {
    /// Nominal position, before any metadata correction.
    pub fn position(&self) -> GeodeticPosition {
        GeodeticPosition::new(self.lat, self.lng, self.alt)
    }
}

/// Time-stamped observatory metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservatoryMetadata {
    pub observatory: ObservatoryId,
    pub key: StatusKey,
    pub value: MetaValue,
    /// Time from which the value is effective
    pub time: UnixTime,
    /// Time the record was written
    pub created: UnixTime,
    pub author: String,
}

/// Classification of a moving object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Meteor,
    Plane,
    Satellite,
    Bird,
    Junk,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Meteor => "meteor",
            Category::Plane => "plane",
            Category::Satellite => "satellite",
            Category::Bird => "bird",
            Category::Junk => "junk",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = PiGazingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meteor" => Ok(Category::Meteor),
            "plane" => Ok(Category::Plane),
            "satellite" => Ok(Category::Satellite),
            "bird" => Ok(Category::Bird),
            "junk" => Ok(Category::Junk),
            "unknown" | "" => Ok(Category::Unknown),
            other => Err(PiGazingError::MalformedInput(format!(
                "unknown category '{other}'"
            ))),
        }
    }
}

/// What an observation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    /// Video detection of a moving object
    MovingObject,
    /// Long-exposure still image of the sky
    StillImage,
}

/// A detection or a still image recorded by one observatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub observatory: ObservatoryId,
    /// Start of the observation
    pub utc: UnixTime,
    pub kind: ObservationKind,
    pub category: Category,
    #[serde(default)]
    pub metadata: BTreeMap<MetaKey, MetaValue>,
}

impl Observation {
    pub fn meta(&self, key: &MetaKey) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    pub fn meta_f64(&self, key: &MetaKey) -> Option<f64> {
        self.meta(key).and_then(MetaValue::as_f64)
    }

    /// Duration in seconds, zero when unknown.
    pub fn duration(&self) -> f64 {
        self.meta_f64(&MetaKey::DURATION).unwrap_or(0.0).max(0.0)
    }

    /// End of the observation.
    pub fn utc_end(&self) -> UnixTime {
        self.utc + self.duration()
    }

    /// Whether the still image already carries an astrometric solution.
    pub fn has_orientation(&self) -> bool {
        MetaKey::ORIENTATION
            .iter()
            .take(3)
            .all(|key| self.metadata.contains_key(key))
    }
}

/// File attached to an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub observation: ObservationId,
    pub mime_type: String,
    pub semantic_type: String,
    pub path: Utf8PathBuf,
    pub utc: UnixTime,
    #[serde(default)]
    pub primary_image: bool,
}

/// Outcome of the triangulation of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriangulationStatus {
    Triangulated,
    TooFewSightLines,
    BaselineTooShort,
    ResidualTooLarge,
}

impl TriangulationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriangulationStatus::Triangulated => "triangulated",
            TriangulationStatus::TooFewSightLines => "too_few_sight_lines",
            TriangulationStatus::BaselineTooShort => "baseline_too_short",
            TriangulationStatus::ResidualTooLarge => "residual_too_large",
        }
    }
}

/// Straight-line trajectory fitted to a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    /// Earth-fixed line, parameter 0 at `utc_start` and 1 at `utc_end`
    pub line: Line,
    pub utc_start: UnixTime,
    pub utc_end: UnixTime,
    pub start: GeodeticPosition,
    pub end: GeodeticPosition,
    /// Meters per second
    pub speed: f64,
    pub mean_altitude: Meter,
    pub max_residual: Degree,
    pub max_baseline: Meter,
    pub radiant_ra: Hour,
    pub radiant_dec: Degree,
    pub sight_line_count: usize,
}

/// Semantic type of groups of simultaneous detections.
pub const SIMULTANEOUS_DETECTION: &str = "pigazing:simultaneous";

/// Observations of one event by several observatories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationGroup {
    pub id: GroupId,
    pub semantic_type: String,
    pub category: Category,
    /// Member observations, in time order
    pub members: Vec<ObservationId>,
    pub observatories: Vec<ObservatoryId>,
    pub utc_start: UnixTime,
    pub utc_end: UnixTime,
    /// Spread of the member start times, seconds
    pub time_spread: f64,
    pub max_baseline: Meter,
    #[serde(default)]
    pub status: Option<TriangulationStatus>,
    #[serde(default)]
    pub trajectory: Option<TrajectoryRecord>,
}

/// Filter for [`ObservationStore::search_observations`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQuery {
    pub utc_min: UnixTime,
    pub utc_max: UnixTime,
    pub kind: Option<ObservationKind>,
    pub categories: Option<Vec<Category>>,
    pub observatories: Option<Vec<ObservatoryId>>,
}

impl ObservationQuery {
    /// All observations starting in `[utc_min, utc_max]`.
    pub fn window(utc_min: UnixTime, utc_max: UnixTime) -> Self {
        ObservationQuery {
            utc_min,
            utc_max,
            kind: None,
            categories: None,
            observatories: None,
        }
    }

    pub fn kind(mut self, kind: ObservationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.categories.get_or_insert_with(Vec::new).push(category);
        self
    }

    /// Restrict to one observatory when `observatory` is `Some`.
    pub fn observatory(mut self, observatory: Option<&str>) -> Self {
        if let Some(id) = observatory {
            self.observatories
                .get_or_insert_with(Vec::new)
                .push(id.to_string());
        }
        self
    }

    pub fn matches(&self, observation: &Observation) -> bool {
        observation.utc >= self.utc_min
            && observation.utc <= self.utc_max
            && self.kind.map_or(true, |k| k == observation.kind)
            && self
                .categories
                .as_ref()
                .map_or(true, |c| c.contains(&observation.category))
            && self
                .observatories
                .as_ref()
                .map_or(true, |o| o.contains(&observation.observatory))
    }
}

/// Storage operations used by the pipeline.
///
/// Read operations fail with the `Unknown*` variants of [`PiGazingError`] for
/// missing ids; a failure of the medium itself is [`PiGazingError::Storage`].
/// Writes become durable on [`ObservationStore::commit`].
pub trait ObservationStore {
    fn observatory(&self, id: &str) -> Result<Observatory, PiGazingError>;

    fn observatories(&self) -> Result<Vec<Observatory>, PiGazingError>;

    /// Effective metadata of an observatory at `utc`.
    fn observatory_status(&self, id: &str, utc: UnixTime)
        -> Result<ObservatoryStatus, PiGazingError>;

    /// Insert a record, replacing any record with the same `(observatory, key, time)`.
    fn write_observatory_metadata(
        &mut self,
        record: ObservatoryMetadata,
    ) -> Result<(), PiGazingError>;

    /// Delete records of the given keys effective in `[utc_min, utc_max]`.
    ///
    /// Return
    /// ----------
    /// * Number of records deleted.
    fn delete_observatory_metadata(
        &mut self,
        observatory: Option<&str>,
        keys: &[StatusKey],
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<usize, PiGazingError>;

    fn observation(&self, id: &str) -> Result<Observation, PiGazingError>;

    fn set_observation_metadata(
        &mut self,
        id: &str,
        key: MetaKey,
        value: MetaValue,
    ) -> Result<(), PiGazingError>;

    /// Remove one metadata key; returns whether it was present.
    fn delete_observation_metadata(&mut self, id: &str, key: &MetaKey)
        -> Result<bool, PiGazingError>;

    /// Observations matching `query`, sorted by `(utc, id)`.
    fn search_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<Observation>, PiGazingError>;

    fn files_for_observation(&self, id: &str) -> Result<Vec<FileRecord>, PiGazingError>;

    fn file_path(&self, file_id: &str) -> Result<Utf8PathBuf, PiGazingError>;

    /// Insert or replace a group.
    fn create_group(&mut self, group: ObservationGroup) -> Result<(), PiGazingError>;

    /// Delete groups of `semantic_type` starting in `[utc_min, utc_max]`; returns the count.
    fn delete_groups(
        &mut self,
        semantic_type: &str,
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<usize, PiGazingError>;

    /// Groups of `semantic_type` starting in `[utc_min, utc_max]`, sorted by `(utc_start, id)`.
    fn groups(
        &self,
        semantic_type: &str,
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<Vec<ObservationGroup>, PiGazingError>;

    fn set_group_trajectory(
        &mut self,
        id: &str,
        status: Option<TriangulationStatus>,
        trajectory: Option<TrajectoryRecord>,
    ) -> Result<(), PiGazingError>;

    /// Make every write so far durable.
    fn commit(&mut self) -> Result<(), PiGazingError> {
        Ok(())
    }
}

#[cfg(test)]
mod store_test {
    use super::*;

    fn observation(utc: UnixTime, category: Category) -> Observation {
        Observation {
            id: format!("{utc}_a"),
            observatory: "a".into(),
            utc,
            kind: ObservationKind::MovingObject,
            category,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Meteor".parse::<Category>().unwrap(), Category::Meteor);
        assert!("comet".parse::<Category>().is_err());
        assert_eq!(Category::Satellite.to_string(), "satellite");
    }

    #[test]
    fn test_query_matches() {
        let q = ObservationQuery::window(10.0, 20.0)
            .category(Category::Meteor)
            .observatory(Some("a"));
        assert!(q.matches(&observation(15.0, Category::Meteor)));
        assert!(q.matches(&observation(20.0, Category::Meteor)));
        assert!(!q.matches(&observation(21.0, Category::Meteor)));
        assert!(!q.matches(&observation(15.0, Category::Plane)));
        let q = q.kind(ObservationKind::StillImage);
        assert!(!q.matches(&observation(15.0, Category::Meteor)));
    }

    #[test]
    fn test_duration() {
        let mut obs = observation(100.0, Category::Meteor);
        assert_eq!(obs.utc_end(), 100.0);
        obs.metadata.insert(MetaKey::DURATION, 2.5.into());
        assert_eq!(obs.utc_end(), 102.5);
    }
}
