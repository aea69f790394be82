//! Read-only access to a built sector store
//!
//! This is the surface downstream analyses consume: iterate a sector's records
//! by name, pick sectors by proximity through the sector index, and run a
//! [`SystemFilter`] over the result.

use super::index::SectorIndex;
use super::writer::is_sector_file;
use super::StoreError;
use crate::ingest::{open_reader, LineReader, RecordStream, SourceError};
use crate::types::{Coordinates, SystemId, SystemRecord, WorkerError};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Read buffer for sector files (they are small next to the source dumps)
const SECTOR_READ_BUFFER: usize = 1024 * 1024;

/// Extension point for consumers of the store.
///
/// Receives one fully decoded record at a time and returns a result for the
/// records it selects.
pub trait SystemFilter: Sync {
    type Output: Send;

    fn filter(&self, system: &SystemRecord) -> Option<Self::Output>;
}

impl<F, T> SystemFilter for F
where
    F: Fn(&SystemRecord) -> Option<T> + Sync,
    T: Send,
{
    type Output = T;

    fn filter(&self, system: &SystemRecord) -> Option<T> {
        self(system)
    }
}

/// Decoded contents of one sector file keyed by system id
#[derive(Debug, Default)]
pub struct LoadedSector {
    pub records: BTreeMap<SystemId, SystemRecord>,
    pub malformed: u64,
}

/// Load every record of a sector file. A missing file is an empty sector.
///
/// Later lines win when an id appears more than once.
pub fn load_sector_file(path: &Path) -> Result<LoadedSector, StoreError> {
    let mut loaded = LoadedSector::default();
    let stream = match open_sector_stream(path) {
        Ok(stream) => stream,
        Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(loaded),
        Err(e) => return Err(e),
    };

    for item in stream {
        match item {
            Ok(record) => {
                loaded.records.insert(record.id64, record);
            }
            Err(e) if e.is_malformed() => loaded.malformed += 1,
            Err(e) => {
                return Err(StoreError::Corrupt {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        }
    }
    Ok(loaded)
}

fn open_sector_stream(path: &Path) -> Result<RecordStream<LineReader>, StoreError> {
    let unit = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let reader = open_reader(path, SECTOR_READ_BUFFER, None).map_err(|e| match e {
        SourceError::NotFound(_) => {
            StoreError::Io(io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
        }
        SourceError::Io(e) => StoreError::Io(e),
        other => StoreError::Corrupt {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    })?;
    Ok(RecordStream::new(reader, unit))
}

/// Matches from a filtered scan
#[derive(Debug)]
pub struct ScanResult<T> {
    pub matches: Vec<T>,
    pub systems_scanned: u64,
    pub malformed: u64,
    pub errors: Vec<WorkerError>,
}

/// A built sector store opened for reading
pub struct SectorStore {
    dir: PathBuf,
    index: SectorIndex,
}

impl SectorStore {
    /// Open a sectors directory. The sector index must exist.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(StoreError::MissingDirectory(dir));
        }
        let index = SectorIndex::load(&dir)?;
        Ok(Self { dir, index })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index(&self) -> &SectorIndex {
        &self.index
    }

    /// Path of a sector's file
    pub fn sector_path(&self, sector: &str) -> Result<PathBuf, StoreError> {
        let entry = self
            .index
            .get(sector)
            .ok_or_else(|| StoreError::UnknownSector(sector.to_string()))?;
        Ok(self.dir.join(&entry.filename))
    }

    /// Stream the records of one sector
    pub fn read_sector(&self, sector: &str) -> Result<RecordStream<LineReader>, StoreError> {
        open_sector_stream(&self.sector_path(sector)?)
    }

    /// Load one sector into memory keyed by id
    pub fn load_sector(&self, sector: &str) -> Result<LoadedSector, StoreError> {
        load_sector_file(&self.sector_path(sector)?)
    }

    /// Names of sectors whose centers lie within `radius` of `point`, closest first
    pub fn sectors_near(&self, point: &Coordinates, radius: f64) -> Vec<String> {
        self.index
            .sectors_within(point, radius)
            .into_iter()
            .map(|(name, _, _)| name.to_string())
            .collect()
    }

    /// Run a filter over the given sectors in parallel.
    ///
    /// A sector that cannot be read is reported in `errors`; the others are
    /// still scanned.
    pub fn scan<F: SystemFilter>(&self, sectors: &[String], filter: &F) -> ScanResult<F::Output> {
        let partials: Vec<Result<(Vec<F::Output>, u64, u64), WorkerError>> = sectors
            .par_iter()
            .map(|sector| {
                let stream = self
                    .read_sector(sector)
                    .map_err(|e| WorkerError::new(sector.as_str(), e))?;
                let mut matches = Vec::new();
                let mut scanned = 0;
                let mut malformed = 0;
                for item in stream {
                    match item {
                        Ok(system) => {
                            scanned += 1;
                            if let Some(hit) = filter.filter(&system) {
                                matches.push(hit);
                            }
                        }
                        Err(e) if e.is_malformed() => malformed += 1,
                        Err(e) => return Err(WorkerError::new(sector.as_str(), e)),
                    }
                }
                Ok((matches, scanned, malformed))
            })
            .collect();

        let mut result = ScanResult {
            matches: Vec::new(),
            systems_scanned: 0,
            malformed: 0,
            errors: Vec::new(),
        };
        for partial in partials {
            match partial {
                Ok((matches, scanned, malformed)) => {
                    result.matches.extend(matches);
                    result.systems_scanned += scanned;
                    result.malformed += malformed;
                }
                Err(e) => {
                    warn!("Scan failed for sector {}", e);
                    result.errors.push(e);
                }
            }
        }
        result
    }

    /// Scan every sector within `radius` of `point`
    pub fn scan_near<F: SystemFilter>(
        &self,
        point: &Coordinates,
        radius: f64,
        filter: &F,
    ) -> ScanResult<F::Output> {
        self.scan(&self.sectors_near(point, radius), filter)
    }
}

/// Result of a store integrity check
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub total_sector_files: usize,
    pub sampled_files: usize,
    pub sample_systems: u64,
    pub sample_stations: u64,
    pub malformed_lines: u64,
    /// (file, reason)
    pub corrupt_files: Vec<(String, String)>,
    /// Index entries without a file
    pub missing_files: Vec<String>,
    /// Problems that prevented a check (no files, no index)
    pub errors: Vec<String>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.corrupt_files.is_empty() && self.missing_files.is_empty() && self.errors.is_empty()
    }
}

/// Check a sectors directory.
///
/// Decodes up to `sample` sector files in full and checks that every entry
/// of the sector index has its file.
pub fn verify(sectors_dir: &Path, sample: usize) -> Result<VerifyReport, StoreError> {
    if !sectors_dir.is_dir() {
        return Err(StoreError::MissingDirectory(sectors_dir.to_path_buf()));
    }
    info!("Verifying sector store at {}", sectors_dir.display());

    let mut report = VerifyReport::default();
    let mut files: Vec<PathBuf> = std::fs::read_dir(sectors_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_sector_file(path))
        .collect();
    files.sort();
    report.total_sector_files = files.len();

    if files.is_empty() {
        report.errors.push("No sector files found".to_string());
    }

    for path in files.iter().take(sample) {
        report.sampled_files += 1;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match load_sector_file(path) {
            Ok(loaded) => {
                report.sample_systems += loaded.records.len() as u64;
                report.sample_stations += loaded
                    .records
                    .values()
                    .map(|s| s.station_count() as u64)
                    .sum::<u64>();
                report.malformed_lines += loaded.malformed;
            }
            Err(e) => report.corrupt_files.push((name, e.to_string())),
        }
    }

    match SectorIndex::load(sectors_dir) {
        Ok(index) => {
            for (sector, entry) in &index.sectors {
                if !sectors_dir.join(&entry.filename).exists() {
                    report.missing_files.push(sector.clone());
                }
            }
        }
        Err(e) => report.errors.push(e.to_string()),
    }

    info!(
        "Verification complete: {} ({} files, {} sampled, {} corrupt)",
        if report.is_valid() { "VALID" } else { "INVALID" },
        report.total_sector_files,
        report.sampled_files,
        report.corrupt_files.len()
    );
    Ok(report)
}
