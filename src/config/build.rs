//! Build and update pipeline configuration

use crate::ingest::DEFAULT_READ_BUFFER;
use serde::{Deserialize, Serialize};

/// Full build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Sectors with fewer standard systems are pruned
    pub min_systems_per_sector: u64,
    /// Records buffered per sector before a flush
    pub write_batch_size: usize,
    /// Records per work unit when splitting a single input file
    pub work_batch_size: usize,
    /// Worker threads (0 = available parallelism)
    pub workers: usize,
    /// Decoded read buffer per input file, in bytes
    pub read_buffer_bytes: usize,
    /// Gzip level for sector files (0-9)
    pub compression_level: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            min_systems_per_sector: 10,
            write_batch_size: 1000,
            work_batch_size: 10_000,
            workers: 0,
            read_buffer_bytes: DEFAULT_READ_BUFFER,
            compression_level: 6,
        }
    }
}

/// Incremental update settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Minimum absolute influence change reported as a faction change
    pub influence_threshold: f64,
    /// Records per work unit
    pub batch_size: usize,
    /// Worker threads (0 = available parallelism)
    pub workers: usize,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            influence_threshold: 0.001,
            batch_size: 10_000,
            workers: 0,
        }
    }
}

/// Resolve a worker setting to a thread count
pub fn resolve_workers(workers: usize) -> usize {
    if workers > 0 {
        return workers;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
