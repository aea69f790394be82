//! Append-only time-series change log
//!
//! ```text
//! <timeseries>/
//!   systems/<YYYYMM>/<sector>_changes.jsonl.gz
//!   stations/<YYYYMM>/station_changes.jsonl.gz
//! ```
//!
//! Files are concatenated gzip members, one per write, so appending never
//! rewrites earlier history.

use super::records::{StationChangeRecord, SystemChangeRecord};
use crate::ingest::open_reader;
use crate::sector::{SectorFormat, SectorWriter, StoreError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SYSTEMS_DIR: &str = "systems";
const STATIONS_DIR: &str = "stations";
const STATION_LOG: &str = "station_changes";
const LOG_READ_BUFFER: usize = 1024 * 1024;

/// Monthly partition key (`YYYYMM`) of a run timestamp
pub fn partition_for(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m").to_string()
}

fn encode_lines<T: Serialize>(records: &[T]) -> Result<Vec<u8>, StoreError> {
    let mut lines = Vec::new();
    for record in records {
        serde_json::to_writer(&mut lines, record)?;
        lines.push(b'\n');
    }
    Ok(lines)
}

/// Writer for the change log tree
pub struct TimeSeriesWriter {
    root: PathBuf,
    format: SectorFormat,
}

impl TimeSeriesWriter {
    pub fn new(root: impl Into<PathBuf>, format: SectorFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_writer(&self, kind: &str, partition: &str) -> Result<SectorWriter, StoreError> {
        let dir = self.root.join(kind).join(partition);
        std::fs::create_dir_all(&dir)?;
        Ok(SectorWriter::new(dir, self.format))
    }

    /// Path of a sector's system log within a partition
    pub fn system_log_path(&self, partition: &str, sector: &str) -> PathBuf {
        SectorWriter::new(self.root.join(SYSTEMS_DIR).join(partition), self.format)
            .path_for(&format!("{}_changes", sector))
    }

    /// Path of the station log within a partition
    pub fn station_log_path(&self, partition: &str) -> PathBuf {
        SectorWriter::new(self.root.join(STATIONS_DIR).join(partition), self.format).path_for(STATION_LOG)
    }

    /// Append system change records grouped by sector. Returns records written.
    pub fn write_system_changes(
        &self,
        partition: &str,
        by_sector: &BTreeMap<String, Vec<SystemChangeRecord>>,
    ) -> Result<u64, StoreError> {
        if by_sector.values().all(Vec::is_empty) {
            return Ok(0);
        }
        let writer = self.partition_writer(SYSTEMS_DIR, partition)?;
        let mut written = 0;
        for (sector, records) in by_sector {
            if records.is_empty() {
                continue;
            }
            writer.append(&format!("{}_changes", sector), &encode_lines(records)?)?;
            written += records.len() as u64;
            debug!("Logged {} system changes for {}", records.len(), sector);
        }
        Ok(written)
    }

    /// Append station change records to the partition's single station log
    pub fn write_station_changes(
        &self,
        partition: &str,
        records: &[StationChangeRecord],
    ) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let writer = self.partition_writer(STATIONS_DIR, partition)?;
        writer.append(STATION_LOG, &encode_lines(records)?)?;
        Ok(records.len() as u64)
    }
}

/// Read every entry of a change log file. Unparseable lines are skipped.
pub fn read_change_log<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let reader = open_reader(path, LOG_READ_BUFFER, None).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping line {} of {}: {}", number + 1, path.display(), e),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeDetector, StationChangeRecord};
    use crate::types::{Coordinates, Station, SystemRecord};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn discovery(id64: u64, name: &str, at: DateTime<Utc>) -> SystemChangeRecord {
        let detector = ChangeDetector::default();
        let system = SystemRecord::new(id64, name, Coordinates::new(1.0, 2.0, 3.0));
        let result = detector.detect_system(None, &system);
        SystemChangeRecord::from_diff(None, &system, &result, &detector, at)
    }

    #[test]
    fn test_partition_key() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(partition_for(&at), "202503");
    }

    #[test]
    fn test_system_changes_append_per_sector() {
        let dir = TempDir::new().unwrap();
        let writer = TimeSeriesWriter::new(dir.path(), SectorFormat::default());
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        let partition = partition_for(&at);

        let mut batch = BTreeMap::new();
        batch.insert("Eol Prou".to_string(), vec![discovery(1, "Eol Prou AB-C d1", at)]);
        assert_eq!(writer.write_system_changes(&partition, &batch).unwrap(), 1);

        batch.insert("Eol Prou".to_string(), vec![discovery(2, "Eol Prou AB-C d2", at)]);
        writer.write_system_changes(&partition, &batch).unwrap();

        let path = writer.system_log_path(&partition, "Eol Prou");
        assert!(path.ends_with("systems/202503/Eol_Prou_changes.jsonl.gz"));
        let entries: Vec<SystemChangeRecord> = read_change_log(&path).unwrap();
        assert_eq!(entries.iter().map(|e| e.id64).collect::<Vec<_>>(), vec![1, 2]);
        assert!(entries.iter().all(SystemChangeRecord::is_discovery));
    }

    #[test]
    fn test_station_changes_single_file() {
        let dir = TempDir::new().unwrap();
        let writer = TimeSeriesWriter::new(dir.path(), SectorFormat::Plain);
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 0).unwrap();
        let system = SystemRecord::new(5, "Lave", Coordinates::default());
        let station: Station = serde_json::from_value(serde_json::json!({ "id": 3, "name": "Lave Station" })).unwrap();
        let detector = ChangeDetector::default();
        let result = detector.detect_station(None, &station);
        let record = StationChangeRecord::from_diff(&system, None, &station, &result, at);

        assert_eq!(writer.write_station_changes("202412", &[record.clone()]).unwrap(), 1);
        assert_eq!(writer.write_station_changes("202412", &[]).unwrap(), 0);

        let path = writer.station_log_path("202412");
        assert!(path.ends_with("stations/202412/station_changes.jsonl"));
        let entries: Vec<StationChangeRecord> = read_change_log(&path).unwrap();
        assert_eq!(entries, vec![record]);
    }

    #[test]
    fn test_empty_batch_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let writer = TimeSeriesWriter::new(dir.path(), SectorFormat::default());
        assert_eq!(writer.write_system_changes("202501", &BTreeMap::new()).unwrap(), 0);
        assert!(!dir.path().join("systems").exists());
    }
}
