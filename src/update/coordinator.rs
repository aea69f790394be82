//! Incremental update of an existing sector store
//!
//! Incoming records are compared with their stored versions in parallel. Every
//! change produces a time-series record; changed systems are collected per
//! home sector and, once the input is exhausted, each touched sector file is
//! loaded, patched by id and rewritten atomically. Untouched sectors are never
//! rewritten.

use super::state::{HomeSector, SectorLocator, SectorStateCache};
use crate::changes::{
    match_station, partition_for, ChangeDetector, StationChangeRecord, SystemChangeRecord,
    TimeSeriesWriter,
};
use crate::config::{resolve_workers, BuildConfig, StoreConfig, UpdateConfig};
use crate::ingest::{for_each_batch, IngestProgress, RecordBatch, RecordSource};
use crate::sector::{load_sector_file, SectorFormat, SectorStore, SectorWriter, StoreError};
use crate::types::{SystemId, SystemRecord, WorkerError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of an incremental update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReport {
    pub systems_processed: u64,
    /// Includes discoveries
    pub systems_changed: u64,
    pub systems_discovered: u64,
    /// Includes discoveries
    pub stations_changed: u64,
    pub stations_discovered: u64,
    pub change_records_written: u64,
    /// Sector files rewritten (sectors sharing a file count once)
    pub sectors_rewritten: u64,
    /// Records without a home sector
    pub skipped_systems: u64,
    pub malformed_lines: u64,
    pub errors: Vec<WorkerError>,
    pub cancelled: bool,
    pub duration_seconds: f64,
}

impl UpdateReport {
    pub fn print_summary(&self) {
        println!("\nUpdate Summary");
        println!("==============");
        println!("Systems processed:   {}", self.systems_processed);
        println!("Systems changed:     {}", self.systems_changed);
        println!("  discovered:        {}", self.systems_discovered);
        println!("Stations changed:    {}", self.stations_changed);
        println!("  discovered:        {}", self.stations_discovered);
        println!("Change records:      {}", self.change_records_written);
        println!("Sectors rewritten:   {}", self.sectors_rewritten);
        println!("Skipped (no sector): {}", self.skipped_systems);
        println!("Malformed lines:     {}", self.malformed_lines);
        println!("Worker errors:       {}", self.errors.len());
        println!("Elapsed time:        {:.1}s", self.duration_seconds);
        if self.cancelled {
            println!("Status:              CANCELLED (store left unchanged)");
        }
        for error in &self.errors {
            println!("  error: {}", error);
        }
    }
}

/// One line of `update_log.jsonl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLogEntry {
    pub update_time: DateTime<Utc>,
    pub update_duration_seconds: f64,
    pub source_files: Vec<String>,
    pub systems_processed: u64,
    pub systems_changed: u64,
    pub systems_discovered: u64,
    pub stations_changed: u64,
    pub stations_discovered: u64,
    pub change_records_written: u64,
    pub sectors_rewritten: u64,
    pub skipped_systems: u64,
    pub worker_errors: usize,
    pub max_workers: usize,
    pub batch_size: usize,
}

impl UpdateLogEntry {
    /// Append this entry as one JSON line
    pub fn append_to(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Read every entry of an update log
    pub fn read_all(path: &Path) -> Result<Vec<Self>, StoreError> {
        let content = std::fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct UpdateCounts {
    processed: u64,
    changed: u64,
    discovered: u64,
    stations_changed: u64,
    stations_discovered: u64,
    skipped: u64,
}

impl UpdateCounts {
    fn add(&mut self, other: UpdateCounts) {
        self.processed += other.processed;
        self.changed += other.changed;
        self.discovered += other.discovered;
        self.stations_changed += other.stations_changed;
        self.stations_discovered += other.stations_discovered;
        self.skipped += other.skipped;
    }
}

/// Records waiting to be written back into one sector file.
///
/// Keyed by file rather than sector name: sectors whose names sanitize alike
/// share a file and must be patched in a single rewrite.
#[derive(Default)]
struct PendingFile {
    sectors: BTreeSet<String>,
    records: HashMap<SystemId, SystemRecord>,
}

/// Everything one worker (or one batch) produced
#[derive(Default)]
struct UpdateOutput {
    counts: UpdateCounts,
    malformed: u64,
    pending: BTreeMap<String, PendingFile>,
    system_changes: BTreeMap<String, Vec<SystemChangeRecord>>,
    station_changes: Vec<StationChangeRecord>,
}

impl UpdateOutput {
    fn stage(&mut self, home: &HomeSector, record: SystemRecord) {
        let pending = self.pending.entry(home.file_name.clone()).or_default();
        pending.sectors.insert(home.name.clone());
        pending.records.insert(record.id64, record);
    }

    fn merge(&mut self, other: UpdateOutput) {
        self.counts.add(other.counts);
        self.malformed += other.malformed;
        for (file_name, pending) in other.pending {
            let existing = self.pending.entry(file_name).or_default();
            existing.sectors.extend(pending.sectors);
            existing.records.extend(pending.records);
        }
        for (sector, records) in other.system_changes {
            self.system_changes.entry(sector).or_default().extend(records);
        }
        self.station_changes.extend(other.station_changes);
    }
}

struct WorkerState {
    cache: SectorStateCache,
    output: UpdateOutput,
}

/// Shared context of the update workers
struct UpdatePass<'a> {
    locator: &'a SectorLocator,
    detector: ChangeDetector,
    timestamp: DateTime<Utc>,
    progress: &'a IngestProgress,
    workers: Vec<Mutex<WorkerState>>,
    errors: Mutex<Vec<WorkerError>>,
}

impl UpdatePass<'_> {
    fn fail(&self, error: WorkerError) {
        warn!("Work unit failed: {}", error);
        self.progress.unit_failed();
        self.errors.lock().push(error);
    }

    fn run_batch(&self, batch: RecordBatch) {
        if let Some(failure) = batch.failure {
            self.fail(WorkerError::new(batch.unit, failure));
            return;
        }

        let slot = rayon::current_thread_index().unwrap_or(0) % self.workers.len().max(1);
        let Some(worker) = self.workers.get(slot) else {
            return;
        };
        let mut worker = worker.lock();
        let WorkerState { cache, output } = &mut *worker;

        match self.detect_batch(&batch.records, cache) {
            Ok(mut batch_output) => {
                batch_output.malformed = batch.malformed;
                self.progress.batch_done(
                    batch_output.counts.processed,
                    batch_output.counts.changed,
                    batch.malformed,
                );
                // later duplicates in this worker compare against the accepted version
                for (file_name, pending) in &batch_output.pending {
                    for record in pending.records.values() {
                        cache.remember(file_name, record.clone());
                    }
                }
                output.merge(batch_output);
            }
            Err(e) => self.fail(WorkerError::new(batch.unit, e)),
        }
    }

    /// Compare one batch against the stored state
    fn detect_batch(
        &self,
        records: &[SystemRecord],
        cache: &mut SectorStateCache,
    ) -> Result<UpdateOutput, StoreError> {
        let mut out = UpdateOutput::default();

        for record in records {
            out.counts.processed += 1;
            let Some(home) = self.locator.locate(record) else {
                out.counts.skipped += 1;
                continue;
            };
            let previous = cache.previous(&home, record.id64)?;

            let mut station_records = Vec::new();
            let old_stations = previous.map(SystemRecord::stations).unwrap_or(&[]);
            for station in record.stations() {
                let old_station = match_station(old_stations, station);
                let result = self.detector.detect_station(old_station, station);
                if result.has_changes {
                    station_records.push(StationChangeRecord::from_diff(
                        record,
                        old_station,
                        station,
                        &result,
                        self.timestamp,
                    ));
                }
            }

            let result = self.detector.detect_system(previous, record);
            if !result.has_changes && station_records.is_empty() {
                continue;
            }

            if result.has_changes {
                out.counts.changed += 1;
                if result.is_discovery() {
                    out.counts.discovered += 1;
                }
                out.system_changes
                    .entry(home.name.clone())
                    .or_default()
                    .push(SystemChangeRecord::from_diff(
                        previous,
                        record,
                        &result,
                        &self.detector,
                        self.timestamp,
                    ));
            }
            out.counts.stations_changed += station_records.len() as u64;
            out.counts.stations_discovered +=
                station_records.iter().filter(|r| r.is_discovery()).count() as u64;
            out.station_changes.extend(station_records);
            out.stage(&home, record.clone());
        }
        Ok(out)
    }

    fn finish(self) -> (UpdateOutput, Vec<WorkerError>, u64) {
        let mut merged = UpdateOutput::default();
        let mut cache_malformed = 0;
        for worker in self.workers {
            let WorkerState { cache, output } = worker.into_inner();
            cache_malformed += cache.malformed();
            merged.merge(output);
        }
        (merged, self.errors.into_inner(), cache_malformed)
    }
}

/// Applies incremental dumps to a built sector store
pub struct IncrementalUpdater {
    store: StoreConfig,
    build: BuildConfig,
    config: UpdateConfig,
}

impl IncrementalUpdater {
    pub fn new(store: StoreConfig, build: BuildConfig, config: UpdateConfig) -> Self {
        Self { store, build, config }
    }

    fn format(&self) -> SectorFormat {
        SectorFormat::from_settings(self.store.compress, self.build.compression_level)
    }

    /// Apply one incremental dump.
    ///
    /// The sectors directory and its index must exist; this is checked before
    /// any input is read. Per-batch and per-sector failures are collected in
    /// the report. A cancelled run writes nothing.
    pub fn update(
        &self,
        source: &RecordSource,
        progress: &IngestProgress,
    ) -> Result<UpdateReport, StoreError> {
        let start = Instant::now();
        let store = SectorStore::open(self.store.sectors_path())?;
        let locator = SectorLocator::new(store.index());
        let timestamp = Utc::now();

        let workers = resolve_workers(self.config.workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sector-update-{}", i))
            .build()
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        info!(
            "Updating {} sectors from {} input file(s) with {} workers",
            store.index().len(),
            source.files().len(),
            workers
        );

        let pass = UpdatePass {
            locator: &locator,
            detector: ChangeDetector::new(self.config.influence_threshold),
            timestamp,
            progress,
            workers: (0..workers)
                .map(|_| {
                    Mutex::new(WorkerState {
                        cache: SectorStateCache::new(store.dir()),
                        output: UpdateOutput::default(),
                    })
                })
                .collect(),
            errors: Mutex::new(Vec::new()),
        };
        pool.install(|| {
            for_each_batch(
                source,
                self.build.read_buffer_bytes,
                self.config.batch_size,
                progress,
                |batch| pass.run_batch(batch),
                |error| pass.fail(error),
            )
        });
        let (output, mut errors, cache_malformed) = pass.finish();
        if cache_malformed > 0 {
            warn!("Skipped {} malformed lines in existing sector files", cache_malformed);
        }

        let counts = output.counts;
        let mut report = UpdateReport {
            systems_processed: counts.processed,
            systems_changed: counts.changed,
            systems_discovered: counts.discovered,
            stations_changed: counts.stations_changed,
            stations_discovered: counts.stations_discovered,
            skipped_systems: counts.skipped,
            malformed_lines: output.malformed,
            ..Default::default()
        };

        if progress.is_cancelled() {
            warn!("Update cancelled; no change records or sector files written");
            report.errors = errors;
            report.cancelled = true;
            report.duration_seconds = start.elapsed().as_secs_f64();
            return Ok(report);
        }

        info!(
            "Detected {} changed systems ({} new), {} changed stations ({} new)",
            counts.changed, counts.discovered, counts.stations_changed, counts.stations_discovered
        );

        // history first: if it cannot be written the sectors stay as they were,
        // so the next run detects the same changes again
        let partition = partition_for(&timestamp);
        progress.set_phase(format!("Writing change log {}", partition));
        match self.write_timeseries(&partition, &output) {
            Ok(written) => {
                report.change_records_written = written;
                progress.set_phase(format!("Rewriting {} sector files", output.pending.len()));
                let writer = SectorWriter::new(store.dir(), self.format());
                let (rewritten, failed) = pool.install(|| rewrite_sectors(&writer, output.pending));
                report.sectors_rewritten = rewritten;
                errors.extend(failed);
            }
            Err(e) => {
                error!("Failed to write change log: {}", e);
                errors.push(WorkerError::new(format!("timeseries/{}", partition), e));
            }
        }

        report.errors = errors;
        report.duration_seconds = start.elapsed().as_secs_f64();

        let entry = UpdateLogEntry {
            update_time: timestamp,
            update_duration_seconds: report.duration_seconds,
            source_files: source.describe(),
            systems_processed: report.systems_processed,
            systems_changed: report.systems_changed,
            systems_discovered: report.systems_discovered,
            stations_changed: report.stations_changed,
            stations_discovered: report.stations_discovered,
            change_records_written: report.change_records_written,
            sectors_rewritten: report.sectors_rewritten,
            skipped_systems: report.skipped_systems,
            worker_errors: report.errors.len(),
            max_workers: workers,
            batch_size: self.config.batch_size,
        };
        if let Err(e) = entry.append_to(&self.store.update_log_path()) {
            warn!("Failed to append update log: {}", e);
        }

        progress.finish();
        info!(
            "Update complete: {} processed, {} changed, {} sectors rewritten ({:.1}s, {} errors)",
            report.systems_processed,
            report.systems_changed,
            report.sectors_rewritten,
            report.duration_seconds,
            report.errors.len()
        );
        Ok(report)
    }

    fn write_timeseries(&self, partition: &str, output: &UpdateOutput) -> Result<u64, StoreError> {
        let writer = TimeSeriesWriter::new(self.store.timeseries_path(), self.format());
        let systems = writer.write_system_changes(partition, &output.system_changes)?;
        let stations = writer.write_station_changes(partition, &output.station_changes)?;
        debug!("Wrote {} system and {} station change records", systems, stations);
        Ok(systems + stations)
    }
}

/// Patch and rewrite every touched sector file. Returns (rewritten, errors).
fn rewrite_sectors(
    writer: &SectorWriter,
    pending: BTreeMap<String, PendingFile>,
) -> (u64, Vec<WorkerError>) {
    let results: Vec<Result<(), WorkerError>> = pending
        .into_par_iter()
        .map(|(file_name, pending)| {
            rewrite_sector(writer, &file_name, &pending).map_err(|e| {
                error!("Failed to rewrite {}: {}", file_name, e);
                WorkerError::new(file_name, e)
            })
        })
        .collect();

    let mut rewritten = 0;
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(()) => rewritten += 1,
            Err(e) => errors.push(e),
        }
    }
    (rewritten, errors)
}

fn rewrite_sector(writer: &SectorWriter, file_name: &str, pending: &PendingFile) -> Result<(), StoreError> {
    let mut loaded = load_sector_file(&writer.dir().join(file_name))?;
    for (id, record) in &pending.records {
        loaded.records.insert(*id, record.clone());
    }

    let mut lines = Vec::new();
    for record in loaded.records.values() {
        serde_json::to_writer(&mut lines, record)?;
        lines.push(b'\n');
    }
    writer.rewrite_file(file_name, &lines)?;
    debug!(
        "Rewrote {} for {:?} ({} systems, {} updated)",
        file_name,
        pending.sectors,
        loaded.records.len(),
        pending.records.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::SectorBuilder;
    use crate::changes::read_change_log;
    use crate::sector::SectorIndex;
    use crate::types::Coordinates;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn system_line(id: u64, name: &str, x: f64, population: u64) -> String {
        json!({
            "id64": id, "name": name,
            "coords": { "x": x, "y": 0.0, "z": 0.0 },
            "population": population,
            "stations": [{ "id": id * 100, "name": format!("{} Port", name), "services": ["Market"] }]
        })
        .to_string()
    }

    fn base_lines() -> Vec<String> {
        let mut lines = Vec::new();
        for i in 0..10u64 {
            lines.push(system_line(i + 1, &format!("Alpha AB-C d{}", i), i as f64, 100));
            lines.push(system_line(i + 101, &format!("Beta AB-C d{}", i), 1000.0 + i as f64, 100));
        }
        lines
    }

    struct Fixture {
        dir: TempDir,
        store: StoreConfig,
        build: BuildConfig,
        update: UpdateConfig,
    }

    impl Fixture {
        fn built() -> Self {
            Self::built_from(&base_lines())
        }

        fn built_from(lines: &[String]) -> Self {
            let dir = TempDir::new().unwrap();
            let store = StoreConfig {
                data_dir: dir.path().join("db"),
                ..Default::default()
            };
            let build = BuildConfig {
                workers: 2,
                write_batch_size: 3,
                work_batch_size: 4,
                ..Default::default()
            };
            let update = UpdateConfig {
                workers: 2,
                batch_size: 3,
                ..Default::default()
            };

            let input = dir.path().join("full.jsonl");
            fs::write(&input, lines.join("\n")).unwrap();
            let source = RecordSource::open(&input).unwrap();
            let progress = IngestProgress::new("build", None, true);
            let report = SectorBuilder::new(store.clone(), build.clone())
                .build(&source, &progress)
                .unwrap();
            assert_eq!(report.sectors_created, 2);

            Self { dir, store, build, update }
        }

        fn run(&self, name: &str, lines: &[String]) -> UpdateReport {
            let input = self.dir.path().join(name);
            fs::write(&input, lines.join("\n")).unwrap();
            let source = RecordSource::open(&input).unwrap();
            let progress = IngestProgress::new("update", None, true);
            IncrementalUpdater::new(self.store.clone(), self.build.clone(), self.update.clone())
                .update(&source, &progress)
                .unwrap()
        }

        fn sector(&self, name: &str) -> BTreeMap<SystemId, SystemRecord> {
            let writer = SectorWriter::new(self.store.sectors_path(), SectorFormat::default());
            load_sector_file(&writer.path_for(name)).unwrap().records
        }

        fn modified(&self, name: &str) -> std::time::SystemTime {
            let writer = SectorWriter::new(self.store.sectors_path(), SectorFormat::default());
            fs::metadata(writer.path_for(name)).unwrap().modified().unwrap()
        }
    }

    #[test]
    fn test_identical_input_changes_nothing() {
        let fixture = Fixture::built();
        let before = (fixture.modified("Alpha"), fixture.modified("Beta"));

        let report = fixture.run("same.jsonl", &base_lines());
        assert_eq!(report.systems_processed, 20);
        assert_eq!(report.systems_changed, 0);
        assert_eq!(report.stations_changed, 0);
        assert_eq!(report.change_records_written, 0);
        assert_eq!(report.sectors_rewritten, 0);
        assert!(report.errors.is_empty());
        assert_eq!(before, (fixture.modified("Alpha"), fixture.modified("Beta")));
        assert!(!fixture.store.timeseries_path().join("systems").exists());
    }

    #[test]
    fn test_changes_and_discoveries() {
        let fixture = Fixture::built();
        let lines = vec![
            // population change in Alpha
            system_line(3, "Alpha AB-C d2", 2.0, 5_000),
            // new standard system in Beta
            system_line(999, "Beta AB-C d99", 1005.0, 0),
            // new non-standard system nearest to Beta
            system_line(1000, "Lonely Star", 990.0, 0),
            // unchanged
            system_line(101, "Beta AB-C d0", 1000.0, 100),
        ];
        let report = fixture.run("delta.jsonl", &lines);

        assert_eq!(report.systems_processed, 4);
        assert_eq!(report.systems_changed, 3);
        assert_eq!(report.systems_discovered, 2);
        assert_eq!(report.stations_discovered, 2);
        assert_eq!(report.stations_changed, 2);
        assert_eq!(report.change_records_written, 5);
        assert_eq!(report.sectors_rewritten, 2);

        let alpha = fixture.sector("Alpha");
        assert_eq!(alpha.len(), 10);
        assert_eq!(alpha[&3].population(), 5_000);

        let beta = fixture.sector("Beta");
        assert_eq!(beta.len(), 12);
        assert!(beta.contains_key(&999));
        assert!(beta.contains_key(&1000));

        let partition = partition_for(&Utc::now());
        let writer = TimeSeriesWriter::new(fixture.store.timeseries_path(), SectorFormat::default());
        let alpha_log: Vec<SystemChangeRecord> =
            read_change_log(&writer.system_log_path(&partition, "Alpha")).unwrap();
        assert_eq!(alpha_log.len(), 1);
        assert_eq!(alpha_log[0].change_type, "population");
        assert_eq!(alpha_log[0].delta.as_ref().unwrap().population_change, Some(4_900));

        let beta_log: Vec<SystemChangeRecord> =
            read_change_log(&writer.system_log_path(&partition, "Beta")).unwrap();
        assert!(beta_log.iter().all(SystemChangeRecord::is_discovery));

        let log = UpdateLogEntry::read_all(&fixture.store.update_log_path()).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].systems_changed, 3);

        // applying the same delta again is a no-op
        let again = fixture.run("delta2.jsonl", &lines);
        assert_eq!(again.systems_changed, 0);
        assert_eq!(again.sectors_rewritten, 0);
        assert_eq!(UpdateLogEntry::read_all(&fixture.store.update_log_path()).unwrap().len(), 2);
    }

    #[test]
    fn test_station_only_change_rewrites_sector() {
        let fixture = Fixture::built();
        let line = json!({
            "id64": 5, "name": "Alpha AB-C d4",
            "coords": { "x": 4.0, "y": 0.0, "z": 0.0 },
            "population": 100,
            "stations": [{ "id": 500, "name": "Alpha AB-C d4 Port", "services": ["Market", "Refuel"] }]
        })
        .to_string();
        let report = fixture.run("station.jsonl", &[line]);

        assert_eq!(report.systems_changed, 0);
        assert_eq!(report.stations_changed, 1);
        assert_eq!(report.change_records_written, 1);
        assert_eq!(report.sectors_rewritten, 1);
        assert_eq!(
            fixture.sector("Alpha")[&5].stations()[0].services(),
            &["Market".to_string(), "Refuel".to_string()]
        );
    }

    #[test]
    fn test_missing_store_is_structural_error() {
        let dir = TempDir::new().unwrap();
        let store = StoreConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let input = dir.path().join("in.jsonl");
        fs::write(&input, system_line(1, "Alpha AB-C d1", 0.0, 1)).unwrap();
        let source = RecordSource::open(&input).unwrap();
        let progress = IngestProgress::new("update", None, true);
        let updater = IncrementalUpdater::new(store.clone(), BuildConfig::default(), UpdateConfig::default());

        assert!(matches!(
            updater.update(&source, &progress),
            Err(StoreError::MissingDirectory(_))
        ));

        fs::create_dir_all(store.sectors_path()).unwrap();
        assert!(matches!(
            updater.update(&source, &progress),
            Err(StoreError::MissingIndex(_))
        ));
    }

    #[test]
    fn test_cancelled_update_writes_nothing() {
        let fixture = Fixture::built();
        let input = fixture.dir.path().join("cancel.jsonl");
        fs::write(&input, system_line(3, "Alpha AB-C d2", 2.0, 5_000)).unwrap();
        let source = RecordSource::open(&input).unwrap();
        let progress = IngestProgress::new("update", None, true);
        progress.cancel();

        let report = IncrementalUpdater::new(
            fixture.store.clone(),
            fixture.build.clone(),
            fixture.update.clone(),
        )
        .update(&source, &progress)
        .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.sectors_rewritten, 0);
        assert_eq!(fixture.sector("Alpha")[&3].population(), 100);
        assert!(!fixture.store.update_log_path().exists());
    }

    #[test]
    fn test_sectors_sharing_a_file_keep_every_update() {
        let mut lines = Vec::new();
        for i in 0..10u64 {
            lines.push(system_line(i + 1, &format!("Col 285 AB-C d{}", i), i as f64, 100));
            lines.push(system_line(i + 101, &format!("Col-285 AB-C d{}", i), i as f64, 100));
        }
        let fixture = Fixture::built_from(&lines);
        let index = SectorIndex::load(&fixture.store.sectors_path()).unwrap();
        assert_eq!(index.get("Col 285").unwrap().filename, "Col_285.jsonl.gz");
        assert_eq!(index.get("Col-285").unwrap().filename, "Col_285.jsonl.gz");

        for round in 1..=4u64 {
            let report = fixture.run(
                &format!("round{}.jsonl", round),
                &[
                    system_line(1, "Col 285 AB-C d0", 0.0, round * 1000),
                    system_line(101, "Col-285 AB-C d0", 0.0, round * 1000),
                ],
            );
            assert!(report.errors.is_empty(), "{:?}", report.errors);
            assert_eq!(report.systems_changed, 2);
            assert_eq!(report.sectors_rewritten, 1);

            let stored = fixture.sector("Col 285");
            assert_eq!(stored.len(), 20);
            assert_eq!(stored[&1].population(), round * 1000, "round {}", round);
            assert_eq!(stored[&101].population(), round * 1000, "round {}", round);
        }
    }

    #[test]
    fn test_output_merge_last_write_wins() {
        let home = HomeSector {
            name: "Alpha".to_string(),
            file_name: "Alpha.jsonl.gz".to_string(),
        };
        let mut a = UpdateOutput::default();
        a.stage(&home, SystemRecord::new(1, "X", Coordinates::default()).with_population(1));
        let mut b = UpdateOutput::default();
        b.stage(&home, SystemRecord::new(1, "X", Coordinates::default()).with_population(2));
        a.merge(b);
        assert_eq!(a.pending["Alpha.jsonl.gz"].records[&1].population(), 2);
    }
}
