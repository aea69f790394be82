//! Prior-state lookup for incremental updates
//!
//! Each worker owns a [`SectorStateCache`]; a sector file is decoded the first
//! time one of its systems is looked up and kept for the rest of the run.
//! Entries are keyed by file, so sectors whose names sanitize alike share one
//! decoded copy. Workers never share caches, so the same file may be loaded by
//! more than one worker.

use crate::sector::{load_sector_file, sector_of, SectorCenters, SectorIndex, StoreError};
use crate::types::{SystemId, SystemRecord};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::debug;

/// The sector a record belongs to in an existing store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HomeSector {
    pub name: String,
    /// File name recorded in the sector index
    pub file_name: String,
}

/// Resolves the home sector of incoming records against the sector index
pub struct SectorLocator {
    files: HashMap<String, String>,
    centers: SectorCenters,
}

impl SectorLocator {
    pub fn new(index: &SectorIndex) -> Self {
        Self {
            files: index
                .sectors
                .iter()
                .map(|(name, entry)| (name.clone(), entry.filename.clone()))
                .collect(),
            centers: index.centers(),
        }
    }

    /// The parsed sector when the index knows it, otherwise the nearest center.
    ///
    /// `None` only when the index has no sectors (or the coordinates are unusable).
    pub fn locate(&self, system: &SystemRecord) -> Option<HomeSector> {
        let name = match sector_of(&system.name) {
            Some(sector) if self.files.contains_key(sector) => sector.to_string(),
            _ => self.centers.nearest(&system.coords)?.name.clone(),
        };
        let file_name = self.files.get(&name)?.clone();
        Some(HomeSector { name, file_name })
    }
}

/// Lazily loaded sector contents private to one worker
pub struct SectorStateCache {
    dir: PathBuf,
    files: HashMap<String, BTreeMap<SystemId, SystemRecord>>,
    malformed: u64,
}

impl SectorStateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: HashMap::new(),
            malformed: 0,
        }
    }

    fn ensure_loaded(&mut self, home: &HomeSector) -> Result<(), StoreError> {
        if self.files.contains_key(&home.file_name) {
            return Ok(());
        }
        let loaded = load_sector_file(&self.dir.join(&home.file_name))?;
        debug!(
            "Loaded sector {} ({} systems, {} malformed lines)",
            home.name,
            loaded.records.len(),
            loaded.malformed
        );
        self.malformed += loaded.malformed;
        self.files.insert(home.file_name.clone(), loaded.records);
        Ok(())
    }

    /// Stored version of a system, loading its sector on first use
    pub fn previous(&mut self, home: &HomeSector, id: SystemId) -> Result<Option<&SystemRecord>, StoreError> {
        self.ensure_loaded(home)?;
        Ok(self.files.get(&home.file_name).and_then(|records| records.get(&id)))
    }

    /// Make a newly accepted version the one later lookups see
    pub fn remember(&mut self, file_name: &str, record: SystemRecord) {
        if let Some(records) = self.files.get_mut(file_name) {
            records.insert(record.id64, record);
        }
    }

    pub fn loaded_files(&self) -> usize {
        self.files.len()
    }

    /// Malformed lines met while loading sector files
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::{IndexMetadata, SectorEntry, SectorFormat, SectorWriter};
    use crate::types::Coordinates;
    use chrono::Utc;
    use tempfile::TempDir;

    fn index(entries: &[(&str, Coordinates)]) -> SectorIndex {
        let writer = SectorWriter::new("unused", SectorFormat::default());
        SectorIndex {
            metadata: IndexMetadata {
                total_systems: 0,
                total_sectors: entries.len() as u64,
                min_systems_per_sector: 10,
                source_files: vec![],
                non_standard_systems: 0,
                standard_systems: 0,
                created_at: Utc::now(),
            },
            sectors: entries
                .iter()
                .map(|(name, center)| {
                    (
                        name.to_string(),
                        SectorEntry {
                            filename: writer.file_name(name),
                            system_count: 10,
                            center_coords: *center,
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_locate_prefers_named_sector() {
        let locator = SectorLocator::new(&index(&[
            ("Alpha", Coordinates::new(0.0, 0.0, 0.0)),
            ("Beta", Coordinates::new(1000.0, 0.0, 0.0)),
        ]));
        // named sector wins even though Alpha is closer
        let named = SystemRecord::new(1, "Beta AB-C d1", Coordinates::new(1.0, 0.0, 0.0));
        assert_eq!(locator.locate(&named).unwrap().name, "Beta");

        let unnamed = SystemRecord::new(2, "Lonely Star", Coordinates::new(900.0, 0.0, 0.0));
        assert_eq!(locator.locate(&unnamed).unwrap().name, "Beta");

        let unknown_sector = SystemRecord::new(3, "Gamma AB-C d1", Coordinates::new(5.0, 0.0, 0.0));
        let home = locator.locate(&unknown_sector).unwrap();
        assert_eq!(home.name, "Alpha");
        assert_eq!(home.file_name, "Alpha.jsonl.gz");
    }

    #[test]
    fn test_locate_without_sectors() {
        let locator = SectorLocator::new(&index(&[]));
        let system = SystemRecord::new(1, "Alpha AB-C d1", Coordinates::default());
        assert!(locator.locate(&system).is_none());
    }

    #[test]
    fn test_cache_loads_once_and_remembers() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::default());
        let stored = SystemRecord::new(7, "Alpha AB-C d7", Coordinates::default()).with_population(10);
        writer.append("Alpha", stored.to_line().unwrap().as_bytes()).unwrap();

        let home = HomeSector {
            name: "Alpha".to_string(),
            file_name: writer.file_name("Alpha"),
        };
        let mut cache = SectorStateCache::new(dir.path());
        assert_eq!(cache.previous(&home, 7).unwrap(), Some(&stored));
        assert_eq!(cache.previous(&home, 8).unwrap(), None);
        assert_eq!(cache.loaded_files(), 1);

        // later lookups are served from memory
        std::fs::remove_file(writer.path_for("Alpha")).unwrap();
        let newer = stored.clone().with_population(20);
        cache.remember(&home.file_name, newer.clone());
        assert_eq!(cache.previous(&home, 7).unwrap(), Some(&newer));
    }

    #[test]
    fn test_sectors_sharing_a_file_share_state() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::default());
        let spaced = SystemRecord::new(1, "Col 285 AB-C d1", Coordinates::default());
        let dashed = SystemRecord::new(2, "Col-285 AB-C d2", Coordinates::default());
        writer.append("Col 285", spaced.to_line().unwrap().as_bytes()).unwrap();
        writer.append("Col-285", dashed.to_line().unwrap().as_bytes()).unwrap();
        assert_eq!(writer.file_name("Col 285"), writer.file_name("Col-285"));

        let first = HomeSector {
            name: "Col 285".to_string(),
            file_name: writer.file_name("Col 285"),
        };
        let second = HomeSector {
            name: "Col-285".to_string(),
            file_name: writer.file_name("Col-285"),
        };
        let mut cache = SectorStateCache::new(dir.path());
        assert!(cache.previous(&first, 1).unwrap().is_some());
        assert!(cache.previous(&second, 2).unwrap().is_some());
        assert_eq!(cache.loaded_files(), 1);

        let newer = dashed.clone().with_population(5);
        cache.remember(&second.file_name, newer.clone());
        assert_eq!(cache.previous(&first, 2).unwrap(), Some(&newer));
    }

    #[test]
    fn test_missing_sector_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut cache = SectorStateCache::new(dir.path());
        let home = HomeSector {
            name: "Nowhere".to_string(),
            file_name: "Nowhere.jsonl.gz".to_string(),
        };
        assert!(cache.previous(&home, 1).unwrap().is_none());
    }
}
