//! Per-process scratch directories.
//!
//! Every run stages its files under `<root>/<pid>_<random>/`. Entries left
//! behind by other processes (crashed runs) are purged on entry, and the
//! directory of this process is removed when the [`ScratchDir`] is dropped.
use std::fs;
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use tempfile::TempDir;

use crate::pigazing_errors::PiGazingError;

/// Scratch space owned by this process.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
    path: Utf8PathBuf,
}

impl ScratchDir {
    /// Purge stale scratch entries under `root`, then create a fresh directory.
    pub fn create(root: &Utf8Path) -> Result<Self, PiGazingError> {
        fs::create_dir_all(root)?;
        let purged = purge_root(root)?;
        if purged > 0 {
            debug!("{root}: purged {purged} stale scratch entries");
        }
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}_", process::id()))
            .tempdir_in(root)?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|p| {
            PiGazingError::Storage(format!("non UTF-8 scratch path {}", p.display()))
        })?;
        Ok(ScratchDir { dir, path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// A fresh sub-directory for one unit of work.
    pub fn job_dir(&self, name: &str) -> Result<Utf8PathBuf, PiGazingError> {
        let dir = self.path.join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove the sub-directory of a finished unit of work.
    ///
    /// Failures are logged and otherwise ignored: the directory goes when the
    /// scratch space is dropped anyway. Returns whether it was removed.
    pub fn release_job_dir(&self, dir: &Utf8Path) -> bool {
        match fs::remove_dir_all(dir) {
            Ok(()) => true,
            Err(e) => {
                debug!("{dir}: scratch cleanup failed: {e}");
                false
            }
        }
    }

    /// Remove the directory now, reporting failures.
    pub fn close(self) -> Result<(), PiGazingError> {
        self.dir.close()?;
        Ok(())
    }
}

/// Owner pid of a scratch entry named `<pid>_<suffix>`.
fn owner_pid(name: &str) -> Option<u32> {
    let (pid, rest) = name.split_once('_')?;
    if rest.is_empty() {
        return None;
    }
    pid.parse().ok()
}

/// Remove scratch entries under `root` that belong to other processes.
///
/// Entries whose name does not look like `<pid>_<suffix>` are left alone.
pub fn purge_root(root: &Utf8Path) -> Result<usize, PiGazingError> {
    let own = process::id();
    let mut purged = 0;
    for entry in root.read_dir_utf8()? {
        let entry = entry?;
        match owner_pid(entry.file_name()) {
            Some(pid) if pid != own => {}
            _ => continue,
        }
        let removed = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        match removed {
            Ok(()) => purged += 1,
            Err(e) => warn!("{}: could not purge: {e}", entry.path()),
        }
    }
    Ok(purged)
}

#[cfg(test)]
mod scratch_test {
    use super::*;

    #[test]
    fn test_owner_pid() {
        assert_eq!(owner_pid("1234_abc"), Some(1234));
        assert_eq!(owner_pid("1234_"), None);
        assert_eq!(owner_pid("notes.txt"), None);
        assert_eq!(owner_pid("x_1"), None);
    }

    #[test]
    fn test_create_purges_stale_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).unwrap();
        let stale_pid = process::id().wrapping_add(1);
        let stale = root.join(format!("{stale_pid}_old"));
        fs::create_dir_all(stale.join("nested")).unwrap();
        fs::write(root.join("keep.txt"), "x").unwrap();

        let scratch = ScratchDir::create(&root).unwrap();
        assert!(!stale.exists());
        assert!(root.join("keep.txt").exists());
        assert!(scratch
            .path()
            .file_name()
            .unwrap()
            .starts_with(&format!("{}_", process::id())));

        let job = scratch.job_dir("obs1").unwrap();
        fs::write(job.join("a.png"), "x").unwrap();
        let job = scratch.job_dir("obs1").unwrap();
        assert_eq!(job.read_dir_utf8().unwrap().count(), 0);

        assert!(scratch.release_job_dir(&job));
        assert!(!job.exists());
        // Already gone: logged, not an error
        assert!(!scratch.release_job_dir(&job));

        let path = scratch.path().to_path_buf();
        scratch.close().unwrap();
        assert!(!path.exists());
    }
}
