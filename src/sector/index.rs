//! The sector index file
//!
//! One JSON document mapping every resolved sector to its file, population
//! and center, plus metadata about the build that produced it. Written once at
//! the end of a full build; everything else only reads it.

use super::centers::{SectorCenter, SectorCenters};
use super::StoreError;
use crate::types::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// File name of the index inside the sectors directory
pub const SECTOR_INDEX_FILE: &str = "sector_index.json";

/// Build metadata stored alongside the sector table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub total_systems: u64,
    pub total_sectors: u64,
    pub min_systems_per_sector: u64,
    pub source_files: Vec<String>,
    pub non_standard_systems: u64,
    pub standard_systems: u64,
    pub created_at: DateTime<Utc>,
}

/// One sector row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorEntry {
    pub filename: String,
    pub system_count: u64,
    pub center_coords: Coordinates,
}

/// The sector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorIndex {
    pub metadata: IndexMetadata,
    pub sectors: BTreeMap<String, SectorEntry>,
}

impl SectorIndex {
    /// Load the index from a sectors directory
    pub fn load(sectors_dir: &Path) -> Result<Self, StoreError> {
        let path = sectors_dir.join(SECTOR_INDEX_FILE);
        if !path.exists() {
            return Err(StoreError::MissingIndex(path));
        }
        let json = std::fs::read_to_string(&path)?;
        let index = serde_json::from_str(&json)?;
        Ok(index)
    }

    /// Write the index atomically (temp file + rename)
    pub fn save(&self, sectors_dir: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(sectors_dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(sectors_dir.join(SECTOR_INDEX_FILE))?;
        Ok(())
    }

    pub fn get(&self, sector: &str) -> Option<&SectorEntry> {
        self.sectors.get(sector)
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    /// Center table for nearest-sector lookups
    pub fn centers(&self) -> SectorCenters {
        SectorCenters::new(
            self.sectors
                .iter()
                .map(|(name, entry)| SectorCenter {
                    name: name.clone(),
                    center: entry.center_coords,
                    system_count: entry.system_count,
                })
                .collect(),
        )
    }

    /// Sectors whose center lies within `radius` light years of `point`,
    /// closest first
    pub fn sectors_within(&self, point: &Coordinates, radius: f64) -> Vec<(&str, &SectorEntry, f64)> {
        let mut hits: Vec<(&str, &SectorEntry, f64)> = self
            .sectors
            .iter()
            .filter_map(|(name, entry)| {
                let distance = entry.center_coords.distance(point);
                (distance <= radius).then_some((name.as_str(), entry, distance))
            })
            .collect();
        hits.sort_by(|a, b| a.2.total_cmp(&b.2));
        hits
    }

    /// Total systems across all sectors
    pub fn total_systems(&self) -> u64 {
        self.sectors.values().map(|e| e.system_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index() -> SectorIndex {
        let mut sectors = BTreeMap::new();
        sectors.insert(
            "Aaekaae".to_string(),
            SectorEntry {
                filename: "Aaekaae.jsonl.gz".to_string(),
                system_count: 12,
                center_coords: Coordinates::new(0.0, 0.0, 0.0),
            },
        );
        sectors.insert(
            "Eol Prou".to_string(),
            SectorEntry {
                filename: "Eol_Prou.jsonl.gz".to_string(),
                system_count: 40,
                center_coords: Coordinates::new(150.0, 0.0, 0.0),
            },
        );
        SectorIndex {
            metadata: IndexMetadata {
                total_systems: 52,
                total_sectors: 2,
                min_systems_per_sector: 10,
                source_files: vec!["galaxy.json.gz".to_string()],
                non_standard_systems: 3,
                standard_systems: 49,
                created_at: Utc::now(),
            },
            sectors,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let index = sample_index();
        index.save(dir.path()).unwrap();

        let loaded = SectorIndex::load(dir.path()).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.total_systems(), 52);
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        sample_index().save(dir.path()).unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(SECTOR_INDEX_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["metadata"]["min_systems_per_sector"], 10);
        assert!(raw["metadata"]["created_at"].is_string());
        assert_eq!(raw["sectors"]["Eol Prou"]["filename"], "Eol_Prou.jsonl.gz");
        assert_eq!(raw["sectors"]["Eol Prou"]["center_coords"]["x"], 150.0);
    }

    #[test]
    fn test_missing_index() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            SectorIndex::load(dir.path()),
            Err(StoreError::MissingIndex(_))
        ));
    }

    #[test]
    fn test_sectors_within() {
        let index = sample_index();
        let hits = index.sectors_within(&Coordinates::new(100.0, 0.0, 0.0), 60.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "Eol Prou");

        let hits = index.sectors_within(&Coordinates::new(100.0, 0.0, 0.0), 100.0);
        let names: Vec<&str> = hits.iter().map(|h| h.0).collect();
        assert_eq!(names, vec!["Eol Prou", "Aaekaae"]);
    }

    #[test]
    fn test_centers_from_index() {
        let centers = sample_index().centers();
        assert_eq!(centers.len(), 2);
        let nearest = centers.nearest(&Coordinates::new(100.0, 0.0, 0.0)).unwrap();
        assert_eq!(nearest.name, "Eol Prou");
    }
}
