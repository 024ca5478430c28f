//! Per-build bookkeeping of bundle hashes and sizes

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::Result;

/// File written next to the build output
pub const BUILD_RECORDS_FILE: &str = "build_records.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Bundle file name
    pub name: String,
    /// Lower-case hex SHA-256 of the bundle file
    pub hash: String,
    /// Bundle file size in bytes
    pub size: u64,
}

/// Records of one build, versioned so consumers can tell builds apart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecords {
    pub version: u32,
    pub records: Vec<BuildRecord>,
}

impl BuildRecords {
    pub fn new(version: u32, mut records: Vec<BuildRecord>) -> Self {
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Self { version, records }
    }

    /// Version for the build following `previous` (1 for the first build)
    pub fn next_version(previous: Option<&BuildRecords>) -> u32 {
        previous.map_or(1, |records| records.version + 1)
    }

    pub fn get(&self, name: &str) -> Option<&BuildRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    /// Bundles that are new or whose hash changed since `previous`
    pub fn changed_since(&self, previous: Option<&BuildRecords>) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| {
                previous
                    .and_then(|previous| previous.get(&record.name))
                    .is_none_or(|old| old.hash != record.hash)
            })
            .map(|record| record.name.clone())
            .collect()
    }

    /// Total size of all recorded bundles
    pub fn total_size(&self) -> u64 {
        self.records.iter().map(|record| record.size).sum()
    }

    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load the records of a previous build in `dir`, if any
    pub fn load_previous(dir: &Path) -> Option<Self> {
        let path = dir.join(BUILD_RECORDS_FILE);
        if !path.exists() {
            return None;
        }
        match Self::load_sync(&path) {
            Ok(records) => Some(records),
            Err(e) => {
                log::warn!("Ignoring unreadable build records {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, hash: &str) -> BuildRecord {
        BuildRecord {
            name: name.to_string(),
            hash: hash.to_string(),
            size: 10,
        }
    }

    #[test]
    fn test_versions_increment() {
        assert_eq!(BuildRecords::next_version(None), 1);
        let previous = BuildRecords::new(4, vec![]);
        assert_eq!(BuildRecords::next_version(Some(&previous)), 5);
    }

    #[test]
    fn test_changed_since() {
        let previous = BuildRecords::new(1, vec![record("ui.bundle", "a"), record("hud.bundle", "b")]);
        let current = BuildRecords::new(
            2,
            vec![record("ui.bundle", "a"), record("hud.bundle", "c"), record("fx.bundle", "d")],
        );

        assert_eq!(current.changed_since(Some(&previous)), vec!["fx.bundle", "hud.bundle"]);
        assert_eq!(current.changed_since(None).len(), 3);
        assert_eq!(current.total_size(), 30);
    }

    #[test]
    fn test_records_persistence() {
        let temp_dir = TempDir::new().unwrap();
        assert!(BuildRecords::load_previous(temp_dir.path()).is_none());

        let records = BuildRecords::new(3, vec![record("ui.bundle", "abc")]);
        records.save_sync(&temp_dir.path().join(BUILD_RECORDS_FILE)).unwrap();

        let loaded = BuildRecords::load_previous(temp_dir.path()).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_unreadable_records_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(BUILD_RECORDS_FILE), "not json").unwrap();
        assert!(BuildRecords::load_previous(temp_dir.path()).is_none());
    }
}
