//! In-memory [`ObservationStore`].
use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::constants::{GroupId, ObservationId, ObservatoryId, UnixTime};
use crate::pigazing_errors::PiGazingError;

use super::keys::{MetaKey, MetaValue, StatusKey};
use super::status::ObservatoryStatus;
use super::{
    FileRecord, Observation, ObservationGroup, ObservationQuery, ObservationStore, Observatory,
    ObservatoryMetadata, TrajectoryRecord, TriangulationStatus,
};

/// Store keeping every entity in ordered maps, so iteration and serialisation are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    observatories: BTreeMap<ObservatoryId, Observatory>,
    #[serde(default)]
    observatory_metadata: Vec<ObservatoryMetadata>,
    #[serde(default)]
    observations: BTreeMap<ObservationId, Observation>,
    #[serde(default)]
    files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    groups: BTreeMap<GroupId, ObservationGroup>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an observatory.
    pub fn add_observatory(&mut self, observatory: Observatory) {
        self.observatories
            .insert(observatory.id.clone(), observatory);
    }

    /// Insert or replace an observation.
    pub fn add_observation(&mut self, observation: Observation) {
        self.observations
            .insert(observation.id.clone(), observation);
    }

    /// Attach a file to an existing observation.
    pub fn add_file(&mut self, file: FileRecord) -> Result<(), PiGazingError> {
        if !self.observations.contains_key(&file.observation) {
            return Err(PiGazingError::UnknownObservation(file.observation));
        }
        if file.primary_image {
            for other in self
                .files
                .values_mut()
                .filter(|f| f.observation == file.observation)
            {
                other.primary_image = false;
            }
        }
        self.files.insert(file.id.clone(), file);
        Ok(())
    }

    /// Every metadata record of an observatory, in effective-time order.
    pub fn metadata_history(&self, observatory: &str) -> Vec<&ObservatoryMetadata> {
        let mut records: Vec<_> = self
            .observatory_metadata
            .iter()
            .filter(|r| r.observatory == observatory)
            .collect();
        records.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.created.total_cmp(&b.created)));
        records
    }

    fn observation_mut(&mut self, id: &str) -> Result<&mut Observation, PiGazingError> {
        self.observations
            .get_mut(id)
            .ok_or_else(|| PiGazingError::UnknownObservation(id.to_string()))
    }
}

impl ObservationStore for MemoryStore {
    fn observatory(&self, id: &str) -> Result<Observatory, PiGazingError> {
        self.observatories
            .get(id)
            .cloned()
            .ok_or_else(|| PiGazingError::UnknownObservatory(id.to_string()))
    }

    fn observatories(&self) -> Result<Vec<Observatory>, PiGazingError> {
        Ok(self.observatories.values().cloned().collect())
    }

    fn observatory_status(
        &self,
        id: &str,
        utc: UnixTime,
    ) -> Result<ObservatoryStatus, PiGazingError> {
        if !self.observatories.contains_key(id) {
            return Err(PiGazingError::UnknownObservatory(id.to_string()));
        }
        let mut status = ObservatoryStatus::new(id);
        for record in self
            .metadata_history(id)
            .into_iter()
            .filter(|r| r.time <= utc)
        {
            status.apply(&record.key, &record.value, record.time);
        }
        Ok(status)
    }

    fn write_observatory_metadata(
        &mut self,
        record: ObservatoryMetadata,
    ) -> Result<(), PiGazingError> {
        if !self.observatories.contains_key(&record.observatory) {
            return Err(PiGazingError::UnknownObservatory(record.observatory));
        }
        self.observatory_metadata.retain(|r| {
            !(r.observatory == record.observatory && r.key == record.key && r.time == record.time)
        });
        self.observatory_metadata.push(record);
        Ok(())
    }

    fn delete_observatory_metadata(
        &mut self,
        observatory: Option<&str>,
        keys: &[StatusKey],
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<usize, PiGazingError> {
        let before = self.observatory_metadata.len();
        self.observatory_metadata.retain(|r| {
            let selected = observatory.map_or(true, |o| r.observatory == o)
                && keys.contains(&r.key)
                && r.time >= utc_min
                && r.time <= utc_max;
            !selected
        });
        Ok(before - self.observatory_metadata.len())
    }

    fn observation(&self, id: &str) -> Result<Observation, PiGazingError> {
        self.observations
            .get(id)
            .cloned()
            .ok_or_else(|| PiGazingError::UnknownObservation(id.to_string()))
    }

    fn set_observation_metadata(
        &mut self,
        id: &str,
        key: MetaKey,
        value: MetaValue,
    ) -> Result<(), PiGazingError> {
        self.observation_mut(id)?.metadata.insert(key, value);
        Ok(())
    }

    fn delete_observation_metadata(
        &mut self,
        id: &str,
        key: &MetaKey,
    ) -> Result<bool, PiGazingError> {
        Ok(self.observation_mut(id)?.metadata.remove(key).is_some())
    }

    fn search_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<Observation>, PiGazingError> {
        let mut found: Vec<Observation> = self
            .observations
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.utc.total_cmp(&b.utc).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    fn files_for_observation(&self, id: &str) -> Result<Vec<FileRecord>, PiGazingError> {
        if !self.observations.contains_key(id) {
            return Err(PiGazingError::UnknownObservation(id.to_string()));
        }
        Ok(self
            .files
            .values()
            .filter(|f| f.observation == id)
            .cloned()
            .collect())
    }

    fn file_path(&self, file_id: &str) -> Result<Utf8PathBuf, PiGazingError> {
        self.files
            .get(file_id)
            .map(|f| f.path.clone())
            .ok_or_else(|| PiGazingError::Storage(format!("no file with id '{file_id}'")))
    }

    fn create_group(&mut self, group: ObservationGroup) -> Result<(), PiGazingError> {
        if let Some(missing) = group
            .members
            .iter()
            .find(|m| !self.observations.contains_key(*m))
        {
            return Err(PiGazingError::UnknownObservation(missing.clone()));
        }
        self.groups.insert(group.id.clone(), group);
        Ok(())
    }

    fn delete_groups(
        &mut self,
        semantic_type: &str,
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<usize, PiGazingError> {
        let before = self.groups.len();
        self.groups.retain(|_, g| {
            !(g.semantic_type == semantic_type && g.utc_start >= utc_min && g.utc_start <= utc_max)
        });
        Ok(before - self.groups.len())
    }

    fn groups(
        &self,
        semantic_type: &str,
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<Vec<ObservationGroup>, PiGazingError> {
        let mut found: Vec<ObservationGroup> = self
            .groups
            .values()
            .filter(|g| {
                g.semantic_type == semantic_type && g.utc_start >= utc_min && g.utc_start <= utc_max
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.utc_start
                .total_cmp(&b.utc_start)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(found)
    }

    fn set_group_trajectory(
        &mut self,
        id: &str,
        status: Option<TriangulationStatus>,
        trajectory: Option<TrajectoryRecord>,
    ) -> Result<(), PiGazingError> {
        let group = self
            .groups
            .get_mut(id)
            .ok_or_else(|| PiGazingError::UnknownGroup(id.to_string()))?;
        group.status = status;
        group.trajectory = trajectory;
        Ok(())
    }
}

#[cfg(test)]
mod memory_test {
    use super::*;
    use crate::store::{Category, ObservationKind, SIMULTANEOUS_DETECTION};

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_observatory(Observatory {
            id: "a".into(),
            name: "Alpha".into(),
            lat: 52.0,
            lng: 0.0,
            alt: 20.0,
            owner: "owner".into(),
        });
        for (id, utc) in [("o2", 20.0), ("o1", 10.0), ("o0", 20.0)] {
            store.add_observation(Observation {
                id: id.into(),
                observatory: "a".into(),
                utc,
                kind: ObservationKind::MovingObject,
                category: Category::Meteor,
                metadata: BTreeMap::new(),
            });
        }
        store
    }

    fn record(key: StatusKey, value: f64, time: UnixTime, created: UnixTime) -> ObservatoryMetadata {
        ObservatoryMetadata {
            observatory: "a".into(),
            key,
            value: value.into(),
            time,
            created,
            author: "test".into(),
        }
    }

    #[test]
    fn test_status_effective_as_of() {
        let mut s = store();
        s.write_observatory_metadata(record(StatusKey::Latitude, 51.0, 100.0, 0.0))
            .unwrap();
        s.write_observatory_metadata(record(StatusKey::Latitude, 53.0, 200.0, 0.0))
            .unwrap();
        assert_eq!(s.observatory_status("a", 50.0).unwrap().latitude, None);
        assert_eq!(s.observatory_status("a", 150.0).unwrap().latitude, Some(51.0));
        assert_eq!(s.observatory_status("a", 200.0).unwrap().latitude, Some(53.0));

        // Same (observatory, key, time) replaces
        s.write_observatory_metadata(record(StatusKey::Latitude, 54.0, 200.0, 1.0))
            .unwrap();
        assert_eq!(s.metadata_history("a").len(), 2);
        assert_eq!(s.observatory_status("a", 300.0).unwrap().latitude, Some(54.0));

        let deleted = s
            .delete_observatory_metadata(Some("a"), &[StatusKey::Latitude], 150.0, 250.0)
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(s.observatory_status("a", 300.0).unwrap().latitude, Some(51.0));
        assert_eq!(
            s.observatory_status("b", 0.0).unwrap_err(),
            PiGazingError::UnknownObservatory("b".into())
        );
    }

    #[test]
    fn test_search_sorted_by_time_then_id() {
        let s = store();
        let ids: Vec<_> = s
            .search_observations(&ObservationQuery::window(0.0, 100.0))
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, ["o1", "o0", "o2"]);
    }

    #[test]
    fn test_groups_window() {
        let mut s = store();
        let group = ObservationGroup {
            id: "grp_o1".into(),
            semantic_type: SIMULTANEOUS_DETECTION.into(),
            category: Category::Meteor,
            members: vec!["o1".into(), "o0".into()],
            observatories: vec!["a".into()],
            utc_start: 10.0,
            utc_end: 20.0,
            time_spread: 10.0,
            max_baseline: 0.0,
            status: None,
            trajectory: None,
        };
        s.create_group(group.clone()).unwrap();
        assert_eq!(s.groups(SIMULTANEOUS_DETECTION, 0.0, 100.0).unwrap(), vec![group]);
        assert_eq!(s.delete_groups(SIMULTANEOUS_DETECTION, 11.0, 100.0).unwrap(), 0);
        assert_eq!(s.delete_groups(SIMULTANEOUS_DETECTION, 0.0, 100.0).unwrap(), 1);
        assert!(s.groups(SIMULTANEOUS_DETECTION, 0.0, 100.0).unwrap().is_empty());
    }

    #[test]
    fn test_observation_metadata() {
        let mut s = store();
        s.set_observation_metadata("o1", MetaKey::SKY_CLARITY, 500.0.into())
            .unwrap();
        assert_eq!(
            s.observation("o1").unwrap().meta_f64(&MetaKey::SKY_CLARITY),
            Some(500.0)
        );
        assert!(s
            .delete_observation_metadata("o1", &MetaKey::SKY_CLARITY)
            .unwrap());
        assert!(!s
            .delete_observation_metadata("o1", &MetaKey::SKY_CLARITY)
            .unwrap());
    }
}
