//! Galaxy Sectors: sector-partitioned galaxy database with change tracking
//!
//! Turns multi-gigabyte galaxy dumps into a store of compressed per-sector
//! JSON Lines files, featuring:
//! - Two-pass parallel build (name-derived sectors, nearest-center assignment)
//! - Streaming gzip / bzip2 / plain input with bounded memory
//! - Sector index for spatial prefiltering by downstream consumers
//! - Incremental updates with fingerprint-based change detection
//! - Monthly time-series log of system and station changes

pub mod build;
pub mod changes;
pub mod config;
pub mod ingest;
pub mod sector;
pub mod types;
pub mod update;

pub use config::Config;
pub use types::*;
