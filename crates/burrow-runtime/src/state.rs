//! Persistent state management.
//!
//! Keeps a JSON index of every container record so that separate
//! invocations of the CLI see the same containers. Each change is a
//! read-modify-write under an exclusive `flock`, and the file is replaced
//! atomically so readers never see a partial document.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, ContainerStatus};
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};

use crate::container::ContainerRecord;
use crate::process;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    containers: Vec<ContainerRecord>,
}

/// The on-disk container index.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl StateStore {
    /// Creates a store backed by `path`. Nothing is touched until first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every persisted record.
    ///
    /// A missing file is an empty index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be locked, read, or parsed.
    pub fn load(&self) -> Result<Vec<ContainerRecord>> {
        let _guard = self.lock()?;
        self.read()
    }

    /// Inserts `record` or replaces the record with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read or written.
    pub fn upsert(&self, record: &ContainerRecord) -> Result<()> {
        self.update(|records| {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
        })
    }

    /// Adds a new record unless another record already uses its name.
    ///
    /// The check and the write happen under one lock, so two processes
    /// cannot both claim a name.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if the name is taken, or an error if the
    /// index cannot be read or written.
    pub fn insert_unique(&self, record: &ContainerRecord) -> Result<()> {
        let _guard = self.lock()?;
        let mut records = self.read()?;
        if records.iter().any(|r| r.name == record.name && r.id != record.id) {
            return Err(BurrowError::DuplicateName {
                name: record.name.clone(),
            });
        }
        records.retain(|r| r.id != record.id);
        records.push(record.clone());
        self.write(&records)
    }

    /// Returns whether a persisted record uses `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn name_in_use(&self, name: &str) -> Result<bool> {
        Ok(self.load()?.iter().any(|r| r.name == name))
    }

    /// Deletes the record with `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read or written.
    pub fn delete(&self, id: &ContainerId) -> Result<()> {
        self.update(|records| records.retain(|r| &r.id != id))
    }

    /// Marks running records whose process no longer exists as stopped.
    ///
    /// Returns the reconciled records.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read or written.
    pub fn reconcile(&self) -> Result<Vec<ContainerRecord>> {
        let _guard = self.lock()?;
        let mut records = self.read()?;
        let mut changed = false;
        for record in records.iter_mut().filter(|r| r.is_running()) {
            if !process::is_alive(record.pid) {
                tracing::info!(
                    container_id = %record.id,
                    pid = record.pid,
                    "container process gone, marking stopped"
                );
                record.status = ContainerStatus::Stopped;
                changed = true;
            }
        }
        if changed {
            self.write(&records)?;
        }
        Ok(records)
    }

    fn update(&self, change: impl FnOnce(&mut Vec<ContainerRecord>)) -> Result<()> {
        let _guard = self.lock()?;
        let mut records = self.read()?;
        change(&mut records);
        self.write(&records)
    }

    fn lock(&self) -> Result<Flock<File>> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BurrowError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| BurrowError::io(&self.lock_path, e))?;
        Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            BurrowError::io(&self.lock_path, std::io::Error::from(errno))
        })
    }

    fn read(&self) -> Result<Vec<ContainerRecord>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BurrowError::io(&self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let state: StateFile = serde_json::from_str(&raw).map_err(|e| BurrowError::Config {
            message: format!("corrupt state file {}: {e}", self.path.display()),
        })?;
        Ok(state.containers)
    }

    fn write(&self, records: &[ContainerRecord]) -> Result<()> {
        let state = StateFile {
            version: STATE_VERSION,
            containers: records.to_vec(),
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&state)?)
            .map_err(|e| BurrowError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| BurrowError::io(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), count = records.len(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::container::ContainerConfig;

    fn record(id: &str, pid: u32, status: ContainerStatus) -> ContainerRecord {
        ContainerRecord {
            id: ContainerId::new(id),
            name: id.to_string(),
            pid,
            status,
            rootfs: PathBuf::from("/rootfs"),
            created_at: Utc::now(),
            config: ContainerConfig::default(),
            network: None,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn upsert_replaces_and_delete_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join("state.json"));
        store.upsert(&record("a", 1, ContainerStatus::Running)).unwrap();
        store.upsert(&record("b", 2, ContainerStatus::Running)).unwrap();
        store.upsert(&record("a", 1, ContainerStatus::Stopped)).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].status, ContainerStatus::Stopped);

        store.delete(&ContainerId::new("a")).unwrap();
        store.delete(&ContainerId::new("missing")).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.as_str(), "b");
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn separate_handles_see_each_others_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = StateStore::new(dir.path().join("state.json"));
        let second = StateStore::new(dir.path().join("state.json"));
        first.upsert(&record("a", 1, ContainerStatus::Running)).unwrap();
        second.upsert(&record("b", 2, ContainerStatus::Running)).unwrap();
        assert_eq!(first.load().unwrap().len(), 2);
    }

    #[test]
    fn insert_unique_rejects_a_name_held_by_another_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = StateStore::new(dir.path().join("state.json"));
        let second = StateStore::new(dir.path().join("state.json"));
        let mut web = record("a", 1, ContainerStatus::Running);
        web.name = "web".into();
        first.insert_unique(&web).unwrap();
        first.insert_unique(&web).expect("same record may be rewritten");

        let mut other = record("b", 2, ContainerStatus::Running);
        other.name = "web".into();
        assert!(matches!(
            second.insert_unique(&other),
            Err(BurrowError::DuplicateName { .. })
        ));
        assert!(second.name_in_use("web").unwrap());
        assert!(!second.name_in_use("db").unwrap());
        assert_eq!(second.load().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            StateStore::new(path).load(),
            Err(BurrowError::Config { .. })
        ));
    }

    #[test]
    fn reconcile_marks_dead_processes_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join("state.json"));
        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        let dead = child.id();
        let _ = child.wait().expect("wait");

        store.upsert(&record("alive", std::process::id(), ContainerStatus::Running)).unwrap();
        store.upsert(&record("dead", dead, ContainerStatus::Running)).unwrap();

        let records = store.reconcile().unwrap();
        let status = |id: &str| records.iter().find(|r| r.id.as_str() == id).unwrap().status;
        assert_eq!(status("alive"), ContainerStatus::Running);
        assert_eq!(status("dead"), ContainerStatus::Stopped);
        assert_eq!(store.load().unwrap(), records);
    }
}
