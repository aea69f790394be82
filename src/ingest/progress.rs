//! Progress tracking for long-running build and update passes

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Snapshot of pass counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub records_processed: u64,
    /// Standard records during a build, changed records during an update
    pub records_matched: u64,
    pub malformed_lines: u64,
    pub failed_units: u64,
    pub bytes_read: u64,
    pub elapsed_seconds: f64,
    pub records_per_second: f64,
}

impl IngestStats {
    pub fn update_rate(&mut self) {
        if self.elapsed_seconds > 0.0 {
            self.records_per_second = self.records_processed as f64 / self.elapsed_seconds;
        }
    }
}

/// Progress tracker shared by all workers of one run
pub struct IngestProgress {
    /// Progress bar (None if running in quiet mode)
    progress_bar: Option<ProgressBar>,
    label: &'static str,
    start_time: Instant,
    processed: AtomicU64,
    matched: AtomicU64,
    malformed: AtomicU64,
    failed_units: AtomicU64,
    /// Raw input bytes, fed by the readers
    bytes_read: Arc<AtomicU64>,
    cancelled: AtomicBool,
}

impl IngestProgress {
    /// Create a tracker. With a known byte total a bar is shown, otherwise a spinner.
    pub fn new(label: &'static str, total_bytes: Option<u64>, quiet: bool) -> Self {
        let progress_bar = if !quiet {
            let pb = match total_bytes {
                Some(total) if total > 0 => {
                    let pb = ProgressBar::new(total);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                    pb
                }
                _ => {
                    let pb = ProgressBar::new_spinner();
                    pb.set_style(
                        ProgressStyle::default_spinner()
                            .template("{spinner:.green} [{elapsed_precise}] {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    pb
                }
            };
            pb.set_prefix(label);
            Some(pb)
        } else {
            None
        };

        Self {
            progress_bar,
            label,
            start_time: Instant::now(),
            processed: AtomicU64::new(0),
            matched: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            failed_units: AtomicU64::new(0),
            bytes_read: Arc::new(AtomicU64::new(0)),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Counter handed to input readers
    pub fn byte_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_read)
    }

    /// Account a finished batch
    pub fn batch_done(&self, records: u64, matched: u64, malformed: u64) {
        let processed = self.processed.fetch_add(records, Ordering::Relaxed) + records;
        self.matched.fetch_add(matched, Ordering::Relaxed);
        self.malformed.fetch_add(malformed, Ordering::Relaxed);

        if let Some(ref pb) = self.progress_bar {
            pb.set_position(self.bytes_read.load(Ordering::Relaxed));

            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                processed as f64 / elapsed
            } else {
                0.0
            };
            pb.set_message(format!(
                "{}: {} records ({:.0}/s), {} errors",
                self.label,
                processed,
                rate,
                self.malformed.load(Ordering::Relaxed) + self.failed_units.load(Ordering::Relaxed)
            ));
        }
    }

    /// Record a work unit that failed as a whole
    pub fn unit_failed(&self) {
        self.failed_units.fetch_add(1, Ordering::Relaxed);
    }

    /// Show a phase message (e.g. "Pass 2")
    pub fn set_phase(&self, message: impl Into<String>) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.into());
        }
    }

    pub fn get_stats(&self) -> IngestStats {
        let mut stats = IngestStats {
            records_processed: self.processed.load(Ordering::Relaxed),
            records_matched: self.matched.load(Ordering::Relaxed),
            malformed_lines: self.malformed.load(Ordering::Relaxed),
            failed_units: self.failed_units.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
            records_per_second: 0.0,
        };
        stats.update_rate();
        stats
    }

    /// Check if the run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Stop handing out new work
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message("Cancelled");
        }
    }

    /// Finish the progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            if pb.is_finished() {
                return;
            }
            let stats = self.get_stats();
            pb.finish_with_message(format!(
                "Done! {} records, {} errors, {:.0} records/s",
                stats.records_processed,
                stats.malformed_lines + stats.failed_units,
                stats.records_per_second
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracking() {
        let progress = IngestProgress::new("build", Some(1000), true);
        progress.byte_counter().fetch_add(400, Ordering::Relaxed);

        progress.batch_done(10, 7, 1);
        progress.batch_done(5, 5, 0);
        progress.unit_failed();

        let stats = progress.get_stats();
        assert_eq!(stats.records_processed, 15);
        assert_eq!(stats.records_matched, 12);
        assert_eq!(stats.malformed_lines, 1);
        assert_eq!(stats.failed_units, 1);
        assert_eq!(stats.bytes_read, 400);
    }

    #[test]
    fn test_cancellation() {
        let progress = IngestProgress::new("update", None, true);
        assert!(!progress.is_cancelled());
        progress.cancel();
        assert!(progress.is_cancelled());
    }
}
