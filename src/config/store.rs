//! Store layout configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the sector store, time series and run metadata live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory; relative sub-directories below resolve against it
    pub data_dir: PathBuf,
    /// Sector files and the sector index
    pub sectors_dir: PathBuf,
    /// Change record time series
    pub timeseries_dir: PathBuf,
    /// Gzip sector files (`false` writes plain `.jsonl`)
    pub compress: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("galaxy_db"),
            sectors_dir: PathBuf::from("galaxy_sectors_compressed"),
            timeseries_dir: PathBuf::from("galaxy_timeseries"),
            compress: true,
        }
    }
}

impl StoreConfig {
    /// Absolute-or-data-relative sectors directory
    pub fn sectors_path(&self) -> PathBuf {
        self.data_dir.join(&self.sectors_dir)
    }

    pub fn timeseries_path(&self) -> PathBuf {
        self.data_dir.join(&self.timeseries_dir)
    }

    pub fn build_metadata_path(&self) -> PathBuf {
        self.data_dir.join("build_metadata.json")
    }

    pub fn update_log_path(&self) -> PathBuf {
        self.data_dir.join("update_log.jsonl")
    }
}
