//! Sector partitioning primitives
//!
//! Sectors are emergent spatial buckets named after the prefix of standard
//! system names. This module holds everything needed to classify records,
//! accumulate sector statistics, resolve centers, and read or write the
//! compressed per-sector JSON Lines files together with the sector index.

pub mod centers;
pub mod index;
pub mod naming;
pub mod stats;
pub mod store;
pub mod writer;

use std::path::PathBuf;
use thiserror::Error;

pub use centers::{Resolution, SectorCenter, SectorCenters};
pub use index::{IndexMetadata, SectorEntry, SectorIndex, SECTOR_INDEX_FILE};
pub use naming::{parse_system_name, sanitize_filename, sector_of, ParsedName};
pub use stats::{SectorStatistics, SectorStats};
pub use store::{load_sector_file, verify, LoadedSector, ScanResult, SectorStore, SystemFilter, VerifyReport};
pub use writer::{SectorFormat, SectorWriter};

/// Errors raised by the sector store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sector directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Sector index not found: {0} (run a full build first)")]
    MissingIndex(PathBuf),

    #[error("Unknown sector: {0}")]
    UnknownSector(String),

    #[error("Failed to read {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

impl From<tempfile::PersistError> for StoreError {
    fn from(err: tempfile::PersistError) -> Self {
        StoreError::Io(err.error)
    }
}
