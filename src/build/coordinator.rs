//! Two-pass sector build
//!
//! Pass 1 streams the source, appends standard records to their sector files
//! and accumulates per-sector statistics, spilling non-standard records to
//! worker-private temp files. Sector centers are then resolved (small sectors
//! are pruned) and Pass 2 streams the spill files, assigning every record to
//! the sector with the nearest center.

use super::batcher::SectorBatcher;
use super::spill::{SpillFile, SpilledRecords};
use crate::config::{resolve_workers, BuildConfig, StoreConfig};
use crate::ingest::{for_each_batch, open_reader, IngestProgress, RecordBatch, RecordSource, RecordStream};
use crate::sector::writer::is_sector_file;
use crate::sector::{
    sector_of, IndexMetadata, SectorCenters, SectorEntry, SectorFormat, SectorIndex,
    SectorStatistics, SectorWriter, StoreError, SECTOR_INDEX_FILE,
};
use crate::types::{SystemRecord, WorkerError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Read buffer for spill files
const SPILL_READ_BUFFER: usize = 4 * 1024 * 1024;

/// Outcome of a full build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    /// Decoded input records (standard + non-standard)
    pub total_systems: u64,
    pub total_stations: u64,
    pub standard_systems: u64,
    pub non_standard_systems: u64,
    /// Non-standard records placed by nearest center
    pub assigned_systems: u64,
    /// Non-standard records that could not be placed
    pub skipped_systems: u64,
    pub malformed_lines: u64,
    pub sectors_created: u64,
    pub pruned_sectors: u64,
    /// Standard records dropped with their pruned sectors
    pub pruned_systems: u64,
    pub errors: Vec<WorkerError>,
    pub cancelled: bool,
    pub duration_seconds: f64,
    pub source_bytes: u64,
    pub store_bytes: u64,
}

impl BuildReport {
    /// Percentage saved relative to the source size
    pub fn compression_ratio(&self) -> f64 {
        if self.source_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.store_bytes as f64 / self.source_bytes as f64) * 100.0
    }

    pub fn print_summary(&self) {
        println!("\nBuild Summary");
        println!("=============");
        println!("Systems processed:   {}", self.total_systems);
        println!("Stations:            {}", self.total_stations);
        println!("Standard systems:    {}", self.standard_systems);
        println!("Non-standard:        {}", self.non_standard_systems);
        println!("  assigned:          {}", self.assigned_systems);
        println!("  skipped:           {}", self.skipped_systems);
        println!("Malformed lines:     {}", self.malformed_lines);
        println!("Sectors created:     {}", self.sectors_created);
        println!("Sectors pruned:      {} ({} systems)", self.pruned_sectors, self.pruned_systems);
        println!("Worker errors:       {}", self.errors.len());
        println!(
            "Store size:          {:.1} MB ({:.1}% savings)",
            self.store_bytes as f64 / 1_000_000.0,
            self.compression_ratio()
        );
        println!("Elapsed time:        {:.1}s", self.duration_seconds);
        if self.cancelled {
            println!("Status:              CANCELLED (no sector index written)");
        }
        for error in &self.errors {
            println!("  error: {}", error);
        }
    }
}

/// Contents of `build_metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub build_time: DateTime<Utc>,
    pub build_duration_seconds: f64,
    pub source_files: Vec<String>,
    pub source_size_mb: f64,
    pub compressed_size_mb: f64,
    pub compression_ratio_percent: f64,
    pub total_systems: u64,
    pub total_stations: u64,
    pub sectors_created: u64,
    pub standard_systems: u64,
    pub non_standard_systems: u64,
    pub assigned_systems: u64,
    pub skipped_systems: u64,
    pub pruned_sectors: u64,
    pub malformed_lines: u64,
    pub worker_errors: usize,
    pub max_workers: usize,
    pub write_batch_size: usize,
    pub work_batch_size: usize,
    pub min_systems_per_sector: u64,
}

impl BuildMetadata {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Private state of one pool thread during Pass 1
struct WorkerState {
    batcher: SectorBatcher,
    spill: SpillFile,
}

/// Contribution of one successfully processed batch
#[derive(Default)]
struct BatchTotals {
    stats: SectorStatistics,
    systems: u64,
    stations: u64,
    standard: u64,
    non_standard: u64,
}

#[derive(Default)]
struct Pass1Totals {
    stats: SectorStatistics,
    systems: u64,
    stations: u64,
    standard: u64,
    non_standard: u64,
    malformed: u64,
}

impl Pass1Totals {
    fn merge(&mut self, batch: BatchTotals, malformed: u64) {
        self.stats.merge(batch.stats);
        self.systems += batch.systems;
        self.stations += batch.stations;
        self.standard += batch.standard;
        self.non_standard += batch.non_standard;
        self.malformed += malformed;
    }
}

/// Shared context for Pass 1 workers
struct Pass1<'a> {
    writer: &'a SectorWriter,
    progress: &'a IngestProgress,
    workers: Vec<Mutex<WorkerState>>,
    totals: Mutex<Pass1Totals>,
    errors: Mutex<Vec<WorkerError>>,
}

/// Per spill-file result of Pass 2
#[derive(Default)]
struct SpillOutcome {
    assigned: HashMap<String, u64>,
    assigned_total: u64,
    skipped: u64,
    malformed: u64,
    error: Option<WorkerError>,
}

/// Two-pass sector builder
pub struct SectorBuilder {
    store: StoreConfig,
    config: BuildConfig,
}

impl SectorBuilder {
    pub fn new(store: StoreConfig, config: BuildConfig) -> Self {
        Self { store, config }
    }

    pub fn sectors_dir(&self) -> PathBuf {
        self.store.sectors_path()
    }

    fn format(&self) -> SectorFormat {
        SectorFormat::from_settings(self.store.compress, self.config.compression_level)
    }

    /// Rebuild the sector store from scratch.
    ///
    /// Existing sector files and the sector index are removed first. Per-unit
    /// failures are collected in the report; only structural problems (the
    /// store directory cannot be prepared) return an error.
    pub fn build(
        &self,
        source: &RecordSource,
        progress: &IngestProgress,
    ) -> Result<BuildReport, StoreError> {
        let start = Instant::now();
        let sectors_dir = self.sectors_dir();
        std::fs::create_dir_all(&sectors_dir)?;

        let writer = SectorWriter::new(&sectors_dir, self.format());
        let cleared = writer.clear()?;
        match std::fs::remove_file(sectors_dir.join(SECTOR_INDEX_FILE)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if cleared > 0 {
            info!("Removed {} existing sector files", cleared);
        }

        let workers = resolve_workers(self.config.workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sector-build-{}", i))
            .build()
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        info!(
            "Pass 1: streaming {} input file(s) ({} bytes) with {} workers",
            source.files().len(),
            source.total_bytes(),
            workers
        );
        let pass1 = Pass1 {
            writer: &writer,
            progress,
            workers: (0..workers)
                .map(|_| {
                    Mutex::new(WorkerState {
                        batcher: SectorBatcher::new(self.config.write_batch_size),
                        spill: SpillFile::new(&sectors_dir),
                    })
                })
                .collect(),
            totals: Mutex::new(Pass1Totals::default()),
            errors: Mutex::new(Vec::new()),
        };
        pool.install(|| self.run_pass1(source, &pass1));
        let (totals, spills, mut errors) = pass1.finish();

        info!(
            "Pass 1 complete: {} standard, {} non-standard, {} malformed",
            totals.standard, totals.non_standard, totals.malformed
        );

        let mut report = BuildReport {
            total_systems: totals.systems,
            total_stations: totals.stations,
            standard_systems: totals.standard,
            non_standard_systems: totals.non_standard,
            malformed_lines: totals.malformed,
            source_bytes: source.total_bytes(),
            ..Default::default()
        };

        if progress.is_cancelled() {
            warn!("Build cancelled after Pass 1; sector index not written");
            report.skipped_systems = totals.non_standard;
            report.errors = errors;
            report.cancelled = true;
            report.duration_seconds = start.elapsed().as_secs_f64();
            report.store_bytes = store_size(&sectors_dir);
            return Ok(report);
        }

        let resolution = SectorCenters::resolve(&totals.stats, self.config.min_systems_per_sector);
        let kept_files: HashSet<String> = resolution
            .centers
            .iter()
            .map(|c| writer.file_name(&c.name))
            .collect();
        for sector in &resolution.pruned {
            // two sector names can sanitize to the same file; keep it if a
            // surviving sector owns it
            if kept_files.contains(&writer.file_name(sector)) {
                debug!("Keeping shared file for pruned sector '{}'", sector);
                continue;
            }
            writer.remove(sector)?;
        }
        report.pruned_sectors = resolution.pruned.len() as u64;
        report.pruned_systems = resolution.pruned_systems;

        let spill_total: u64 = spills.iter().map(|s| s.count).sum();
        info!(
            "Pass 2: assigning {} non-standard records to {} sectors",
            spill_total,
            resolution.centers.len()
        );
        progress.set_phase(format!("Pass 2: assigning {} records", spill_total));

        let outcomes: Vec<SpillOutcome> = pool.install(|| {
            spills
                .par_iter()
                .map(|spill| self.assign_spill(spill, &resolution.centers, &writer, progress))
                .collect()
        });
        // dropping the handles deletes the spill files
        drop(spills);

        let mut assigned: HashMap<String, u64> = HashMap::new();
        for outcome in outcomes {
            for (sector, count) in outcome.assigned {
                *assigned.entry(sector).or_default() += count;
            }
            report.assigned_systems += outcome.assigned_total;
            report.skipped_systems += outcome.skipped;
            report.malformed_lines += outcome.malformed;
            if let Some(error) = outcome.error {
                progress.unit_failed();
                errors.push(error);
            }
        }
        // records lost with a failed Pass-1 spill write never reached a spill file
        let unspilled = totals.non_standard.saturating_sub(spill_total);
        report.skipped_systems += unspilled;

        if progress.is_cancelled() {
            warn!("Build cancelled during Pass 2; sector index not written");
            report.errors = errors;
            report.cancelled = true;
            report.duration_seconds = start.elapsed().as_secs_f64();
            report.store_bytes = store_size(&sectors_dir);
            return Ok(report);
        }

        info!(
            "Pass 2 complete: {} assigned, {} skipped",
            report.assigned_systems, report.skipped_systems
        );

        let sectors: BTreeMap<String, SectorEntry> = resolution
            .centers
            .iter()
            .map(|center| {
                let extra = assigned.get(&center.name).copied().unwrap_or(0);
                (
                    center.name.clone(),
                    SectorEntry {
                        filename: writer.file_name(&center.name),
                        system_count: center.system_count + extra,
                        center_coords: center.center,
                    },
                )
            })
            .collect();

        let index = SectorIndex {
            metadata: IndexMetadata {
                total_systems: totals.systems,
                total_sectors: sectors.len() as u64,
                min_systems_per_sector: self.config.min_systems_per_sector,
                source_files: source.describe(),
                non_standard_systems: totals.non_standard,
                standard_systems: totals.standard,
                created_at: Utc::now(),
            },
            sectors,
        };
        index.save(&sectors_dir)?;

        report.sectors_created = index.len() as u64;
        report.errors = errors;
        report.duration_seconds = start.elapsed().as_secs_f64();
        report.store_bytes = store_size(&sectors_dir);

        if let Err(e) = self.write_metadata(&report, source, workers) {
            warn!("Failed to write build metadata: {}", e);
        }

        progress.finish();
        info!(
            "Build complete: {} systems in {} sectors ({:.1}s, {} errors)",
            report.total_systems,
            report.sectors_created,
            report.duration_seconds,
            report.errors.len()
        );
        Ok(report)
    }

    /// Feed Pass 1 work units into the pool
    fn run_pass1(&self, source: &RecordSource, pass1: &Pass1<'_>) {
        for_each_batch(
            source,
            self.config.read_buffer_bytes,
            self.config.work_batch_size,
            pass1.progress,
            |batch| pass1.run_batch(batch),
            |error| pass1.fail(error),
        );
    }

    /// Assign the records of one spill file to their nearest sectors
    fn assign_spill(
        &self,
        spill: &SpilledRecords,
        centers: &SectorCenters,
        writer: &SectorWriter,
        progress: &IngestProgress,
    ) -> SpillOutcome {
        let unit = spill
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "spill".to_string());
        let mut outcome = SpillOutcome::default();
        let mut batcher = SectorBatcher::new(self.config.write_batch_size);

        let result = (|| -> Result<(), StoreError> {
            let reader = open_reader(&spill.path, SPILL_READ_BUFFER, None)
                .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
            for item in RecordStream::new(reader, unit.clone()) {
                if progress.is_cancelled() {
                    break;
                }
                match item {
                    Ok(record) => {
                        if let Some(center) = centers.nearest(&record.coords) {
                            let line = record.to_line()?;
                            batcher.push(writer, &center.name, line.as_bytes())?;
                            match outcome.assigned.get_mut(&center.name) {
                                Some(count) => *count += 1,
                                None => {
                                    outcome.assigned.insert(center.name.clone(), 1);
                                }
                            }
                            outcome.assigned_total += 1;
                        }
                    }
                    Err(e) if e.is_malformed() => outcome.malformed += 1,
                    Err(e) => {
                        return Err(StoreError::Corrupt {
                            path: spill.path.to_path_buf(),
                            message: e.to_string(),
                        })
                    }
                }
            }
            batcher.flush_all(writer)
        })();

        if let Err(e) = result {
            warn!("Pass 2 failed for {}: {}", unit, e);
            outcome.error = Some(WorkerError::new(unit, e));
        }
        // whatever was not placed counts as skipped
        outcome.skipped = spill.count.saturating_sub(outcome.assigned_total);
        progress.batch_done(0, outcome.assigned_total, outcome.malformed);
        outcome
    }

    fn write_metadata(
        &self,
        report: &BuildReport,
        source: &RecordSource,
        workers: usize,
    ) -> Result<(), StoreError> {
        let metadata = BuildMetadata {
            build_time: Utc::now(),
            build_duration_seconds: report.duration_seconds,
            source_files: source.describe(),
            source_size_mb: report.source_bytes as f64 / 1_000_000.0,
            compressed_size_mb: report.store_bytes as f64 / 1_000_000.0,
            compression_ratio_percent: report.compression_ratio(),
            total_systems: report.total_systems,
            total_stations: report.total_stations,
            sectors_created: report.sectors_created,
            standard_systems: report.standard_systems,
            non_standard_systems: report.non_standard_systems,
            assigned_systems: report.assigned_systems,
            skipped_systems: report.skipped_systems,
            pruned_sectors: report.pruned_sectors,
            malformed_lines: report.malformed_lines,
            worker_errors: report.errors.len(),
            max_workers: workers,
            write_batch_size: self.config.write_batch_size,
            work_batch_size: self.config.work_batch_size,
            min_systems_per_sector: self.config.min_systems_per_sector,
        };
        let path = self.store.build_metadata_path();
        metadata.save(&path)?;
        info!("Build metadata written to {}", path.display());
        Ok(())
    }
}

impl Pass1<'_> {
    fn fail(&self, error: WorkerError) {
        warn!("Work unit failed: {}", error);
        self.progress.unit_failed();
        self.errors.lock().push(error);
    }

    /// Process one batch on the calling pool thread
    fn run_batch(&self, batch: RecordBatch) {
        if let Some(failure) = batch.failure {
            // a unit whose input broke contributes nothing
            self.fail(WorkerError::new(batch.unit, failure));
            return;
        }

        let slot = rayon::current_thread_index().unwrap_or(0) % self.workers.len().max(1);
        let Some(worker) = self.workers.get(slot) else {
            return;
        };
        let result = {
            let mut worker = worker.lock();
            classify_batch(&batch.records, &mut worker)
                .map(|totals| (totals, worker.batcher.flush_full(self.writer)))
        };

        match result {
            Ok((totals, flushed)) => {
                self.progress
                    .batch_done(totals.systems, totals.standard, batch.malformed);
                self.totals.lock().merge(totals, batch.malformed);
                // the batch is accepted; unwritten lines stay buffered for the final flush
                if let Err(e) = flushed {
                    warn!("Sector flush after {} failed: {}", batch.unit, e);
                    self.errors.lock().push(WorkerError::new(format!("{} flush", batch.unit), e));
                }
            }
            Err(e) => self.fail(WorkerError::new(batch.unit, e)),
        }
    }

    /// Flush every worker's buffers and collect the results
    fn finish(self) -> (Pass1Totals, Vec<SpilledRecords>, Vec<WorkerError>) {
        let mut errors = self.errors.into_inner();
        let mut spills = Vec::new();

        for (i, worker) in self.workers.into_iter().enumerate() {
            let WorkerState { mut batcher, spill } = worker.into_inner();
            if let Err(e) = batcher.flush_all(self.writer) {
                warn!("Final flush failed for worker {}: {}", i, e);
                errors.push(WorkerError::new(format!("worker-{} flush", i), e));
            }
            match spill.finish() {
                Ok(Some(spilled)) => spills.push(spilled),
                Ok(None) => {}
                Err(e) => errors.push(WorkerError::new(format!("worker-{} spill", i), e)),
            }
        }
        debug!("Pass 1 produced {} spill file(s)", spills.len());

        (self.totals.into_inner(), spills, errors)
    }
}

/// Classify a batch: standard records go to their sector buffers, the rest to
/// the worker's spill file
fn classify_batch(records: &[SystemRecord], worker: &mut WorkerState) -> Result<BatchTotals, StoreError> {
    let mut totals = BatchTotals::default();
    let mut standard = Vec::new();
    let mut spill_lines = Vec::new();

    for record in records {
        let line = record.to_line()?;
        totals.systems += 1;
        totals.stations += record.station_count() as u64;

        match sector_of(&record.name) {
            Some(sector) => {
                totals.stats.record(sector, &record.coords);
                totals.standard += 1;
                standard.push((sector, line));
            }
            None => {
                spill_lines.extend_from_slice(line.as_bytes());
                totals.non_standard += 1;
            }
        }
    }

    // nothing reaches the worker state until the whole batch has encoded
    worker.spill.write(&spill_lines, totals.non_standard)?;
    for (sector, line) in &standard {
        worker.batcher.stage(sector, line.as_bytes());
    }
    Ok(totals)
}

/// Total size of the sector files in a directory
fn store_size(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| is_sector_file(p))
                .filter_map(|p| p.metadata().ok())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}
