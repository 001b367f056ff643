//! In-memory index of container records.
//!
//! Names are unique across records and pending reservations, so two
//! concurrent creates with the same name cannot both succeed.

use std::collections::{HashMap, HashSet};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ContainerId;

use crate::container::ContainerRecord;

/// Container records keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<ContainerId, ContainerRecord>,
    reserved_names: HashSet<String>,
}

impl Registry {
    /// Builds a registry from persisted records.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = ContainerRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            reserved_names: HashSet::new(),
        }
    }

    /// Claims `name` for a container that is being created.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if a record or another reservation holds it.
    pub fn reserve_name(&mut self, name: &str) -> Result<()> {
        if self.name_taken(name) {
            return Err(BurrowError::DuplicateName {
                name: name.to_string(),
            });
        }
        let _ = self.reserved_names.insert(name.to_string());
        Ok(())
    }

    /// Drops a reservation that will not become a record.
    pub fn release_name(&mut self, name: &str) {
        let _ = self.reserved_names.remove(name);
    }

    /// Adds a record, consuming the reservation for its name.
    pub fn insert(&mut self, record: ContainerRecord) {
        let _ = self.reserved_names.remove(&record.name);
        let _ = self.records.insert(record.id.clone(), record);
    }

    /// Looks up a record by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has `id`.
    pub fn get(&self, id: &ContainerId) -> Result<&ContainerRecord> {
        self.records.get(id).ok_or_else(|| not_found(id.as_str()))
    }

    /// Looks up a record by id for modification.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has `id`.
    pub fn get_mut(&mut self, id: &ContainerId) -> Result<&mut ContainerRecord> {
        self.records.get_mut(id).ok_or_else(|| not_found(id.as_str()))
    }

    /// Removes and returns a record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has `id`.
    pub fn remove(&mut self, id: &ContainerId) -> Result<ContainerRecord> {
        self.records.remove(id).ok_or_else(|| not_found(id.as_str()))
    }

    /// Copies every record, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ContainerRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finds a container by exact id, exact name, or unique id prefix.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing matches and `Config` if a prefix
    /// matches more than one container.
    pub fn resolve(&self, query: &str) -> Result<ContainerId> {
        let exact = ContainerId::new(query);
        if self.records.contains_key(&exact) {
            return Ok(exact);
        }
        if let Some(record) = self.records.values().find(|r| r.name == query) {
            return Ok(record.id.clone());
        }
        if query.is_empty() {
            return Err(not_found(query));
        }
        let mut matches = self
            .records
            .keys()
            .filter(|id| id.as_str().starts_with(query));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            (Some(_), Some(_)) => Err(BurrowError::Config {
                message: format!("container prefix '{query}' is ambiguous"),
            }),
            (None, _) => Err(not_found(query)),
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.reserved_names.contains(name) || self.records.values().any(|r| r.name == name)
    }
}

fn not_found(id: &str) -> BurrowError {
    BurrowError::NotFound {
        kind: "container",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use burrow_common::types::ContainerStatus;
    use chrono::{Duration, Utc};

    use super::*;
    use crate::container::ContainerConfig;

    fn record(id: &str, name: &str, age_secs: i64) -> ContainerRecord {
        ContainerRecord {
            id: ContainerId::new(id),
            name: name.to_string(),
            pid: 1,
            status: ContainerStatus::Running,
            rootfs: PathBuf::from("/rootfs"),
            created_at: Utc::now() - Duration::seconds(age_secs),
            config: ContainerConfig::default(),
            network: None,
        }
    }

    #[test]
    fn names_are_unique_across_records_and_reservations() {
        let mut registry = Registry::from_records([record("aaa", "web", 0)]);
        assert!(matches!(
            registry.reserve_name("web"),
            Err(BurrowError::DuplicateName { .. })
        ));
        registry.reserve_name("db").unwrap();
        assert!(registry.reserve_name("db").is_err());
        registry.release_name("db");
        registry.reserve_name("db").unwrap();
        registry.insert(record("bbb", "db", 0));
        assert!(registry.reserve_name("db").is_err());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn removed_names_become_available() {
        let mut registry = Registry::from_records([record("aaa", "web", 0)]);
        let removed = registry.remove(&ContainerId::new("aaa")).unwrap();
        assert_eq!(removed.name, "web");
        registry.reserve_name("web").unwrap();
        assert!(matches!(
            registry.remove(&ContainerId::new("aaa")),
            Err(BurrowError::NotFound { .. })
        ));
    }

    #[test]
    fn snapshot_is_ordered_by_creation() {
        let registry = Registry::from_records([
            record("new", "n", 0),
            record("old", "o", 60),
            record("mid", "m", 30),
        ]);
        let ids: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|r| r.id.as_str().to_string())
            .collect();
        assert_eq!(ids, ["old", "mid", "new"]);
    }

    #[test]
    fn resolve_accepts_id_name_and_unique_prefix() {
        let registry = Registry::from_records([
            record("abc123", "web", 0),
            record("abd456", "db", 0),
        ]);
        assert_eq!(registry.resolve("abc123").unwrap().as_str(), "abc123");
        assert_eq!(registry.resolve("db").unwrap().as_str(), "abd456");
        assert_eq!(registry.resolve("abc").unwrap().as_str(), "abc123");
        assert!(matches!(
            registry.resolve("ab"),
            Err(BurrowError::Config { .. })
        ));
        assert!(matches!(
            registry.resolve("zzz"),
            Err(BurrowError::NotFound { .. })
        ));
        assert!(registry.resolve("").is_err());
    }
}
