//! File-backed [`ObservationStore`].
//!
//! The archive is a single JSON document holding a [`MemoryStore`]. Writes are
//! applied in memory; [`ObservationStore::commit`] stages the whole document
//! into a temporary file next to the destination and renames it over the
//! archive, so readers only ever see a complete document.
use std::fs;
use std::io::{BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use tempfile::NamedTempFile;

use crate::constants::UnixTime;
use crate::pigazing_errors::PiGazingError;

use super::keys::{MetaKey, MetaValue, StatusKey};
use super::memory::MemoryStore;
use super::status::ObservatoryStatus;
use super::{
    FileRecord, Observation, ObservationGroup, ObservationQuery, ObservationStore, Observatory,
    ObservatoryMetadata, TrajectoryRecord, TriangulationStatus,
};

#[derive(Debug)]
pub struct ArchiveStore {
    path: Utf8PathBuf,
    inner: MemoryStore,
    dirty: bool,
}

impl ArchiveStore {
    /// Open an archive; a missing file opens as an empty store.
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, PiGazingError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let reader = BufReader::new(fs::File::open(&path).map_err(storage(&path))?);
            serde_json::from_reader(reader)
                .map_err(|e| PiGazingError::Storage(format!("{path}: {e}")))?
        } else {
            MemoryStore::new()
        };
        Ok(ArchiveStore {
            path,
            inner,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Read access to the underlying in-memory store.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Write access to the underlying store, used to import observations.
    pub fn inner_mut(&mut self) -> &mut MemoryStore {
        self.dirty = true;
        &mut self.inner
    }

    /// Drop uncommitted writes by reloading the archive.
    pub fn rollback(&mut self) -> Result<(), PiGazingError> {
        if self.dirty {
            *self = ArchiveStore::open(&self.path)?;
        }
        Ok(())
    }

    fn write(&mut self) -> &mut MemoryStore {
        self.dirty = true;
        &mut self.inner
    }
}

fn storage(path: &Utf8Path) -> impl Fn(std::io::Error) -> PiGazingError + '_ {
    move |e| PiGazingError::Storage(format!("{path}: {e}"))
}

impl ObservationStore for ArchiveStore {
    fn observatory(&self, id: &str) -> Result<Observatory, PiGazingError> {
        self.inner.observatory(id)
    }

    fn observatories(&self) -> Result<Vec<Observatory>, PiGazingError> {
        self.inner.observatories()
    }

    fn observatory_status(
        &self,
        id: &str,
        utc: UnixTime,
    ) -> Result<ObservatoryStatus, PiGazingError> {
        self.inner.observatory_status(id, utc)
    }

    fn write_observatory_metadata(
        &mut self,
        record: ObservatoryMetadata,
    ) -> Result<(), PiGazingError> {
        self.write().write_observatory_metadata(record)
    }

    fn delete_observatory_metadata(
        &mut self,
        observatory: Option<&str>,
        keys: &[StatusKey],
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<usize, PiGazingError> {
        self.write()
            .delete_observatory_metadata(observatory, keys, utc_min, utc_max)
    }

    fn observation(&self, id: &str) -> Result<Observation, PiGazingError> {
        self.inner.observation(id)
    }

    fn set_observation_metadata(
        &mut self,
        id: &str,
        key: MetaKey,
        value: MetaValue,
    ) -> Result<(), PiGazingError> {
        self.write().set_observation_metadata(id, key, value)
    }

    fn delete_observation_metadata(
        &mut self,
        id: &str,
        key: &MetaKey,
    ) -> Result<bool, PiGazingError> {
        self.write().delete_observation_metadata(id, key)
    }

    fn search_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<Observation>, PiGazingError> {
        self.inner.search_observations(query)
    }

    fn files_for_observation(&self, id: &str) -> Result<Vec<FileRecord>, PiGazingError> {
        self.inner.files_for_observation(id)
    }

    fn file_path(&self, file_id: &str) -> Result<Utf8PathBuf, PiGazingError> {
        let path = self.inner.file_path(file_id)?;
        // Relative file paths are relative to the archive
        if path.is_relative() {
            if let Some(dir) = self.path.parent() {
                return Ok(dir.join(path));
            }
        }
        Ok(path)
    }

    fn create_group(&mut self, group: ObservationGroup) -> Result<(), PiGazingError> {
        self.write().create_group(group)
    }

    fn delete_groups(
        &mut self,
        semantic_type: &str,
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<usize, PiGazingError> {
        self.write().delete_groups(semantic_type, utc_min, utc_max)
    }

    fn groups(
        &self,
        semantic_type: &str,
        utc_min: UnixTime,
        utc_max: UnixTime,
    ) -> Result<Vec<ObservationGroup>, PiGazingError> {
        self.inner.groups(semantic_type, utc_min, utc_max)
    }

    fn set_group_trajectory(
        &mut self,
        id: &str,
        status: Option<TriangulationStatus>,
        trajectory: Option<TrajectoryRecord>,
    ) -> Result<(), PiGazingError> {
        self.write().set_group_trajectory(id, status, trajectory)
    }

    fn commit(&mut self) -> Result<(), PiGazingError> {
        if !self.dirty {
            return Ok(());
        }
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        let staged = NamedTempFile::new_in(&dir).map_err(storage(&dir))?;
        {
            let mut writer = BufWriter::new(staged.as_file());
            serde_json::to_writer(&mut writer, &self.inner)
                .map_err(|e| PiGazingError::Storage(format!("{}: {e}", self.path)))?;
            writer.flush().map_err(storage(&self.path))?;
        }
        staged.as_file().sync_all().map_err(storage(&self.path))?;
        staged
            .persist(&self.path)
            .map_err(|e| PiGazingError::Storage(format!("{}: {}", self.path, e.error)))?;
        self.dirty = false;
        debug!("committed archive {}", self.path);
        Ok(())
    }
}
