//! Configuration for the galaxy sector store

mod build;
mod logging;
mod store;

pub use build::{resolve_workers, BuildConfig, UpdateConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use store::StoreConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "galaxy-sectors.toml";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store layout
    #[serde(default)]
    pub store: StoreConfig,
    /// Full build settings
    #[serde(default)]
    pub build: BuildConfig,
    /// Incremental update settings
    #[serde(default)]
    pub update: UpdateConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Serialize to TOML (used by `init`)
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate all configuration fields.
    ///
    /// Every problem is collected and reported in one error.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Store
        if self.store.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }
        if self.store.sectors_dir.as_os_str().is_empty() {
            errors.push("sectors_dir must not be empty".to_string());
        }
        if self.store.timeseries_dir.as_os_str().is_empty() {
            errors.push("timeseries_dir must not be empty".to_string());
        }

        // Build
        if self.build.min_systems_per_sector == 0 {
            errors.push("min_systems_per_sector must be at least 1".to_string());
        }
        if self.build.write_batch_size == 0 {
            errors.push("write_batch_size must be positive".to_string());
        }
        if self.build.work_batch_size == 0 {
            errors.push("work_batch_size must be positive".to_string());
        }
        if self.build.read_buffer_bytes < 4096 {
            errors.push("read_buffer_bytes must be at least 4096".to_string());
        }
        if self.build.compression_level > 9 {
            errors.push(format!(
                "compression_level must be between 0 and 9, got {}",
                self.build.compression_level
            ));
        }

        // Update
        if self.update.influence_threshold <= 0.0 || self.update.influence_threshold >= 1.0 {
            errors.push("influence_threshold must be between 0.0 and 1.0 (exclusive)".to_string());
        }
        if self.update.batch_size == 0 {
            errors.push("update batch_size must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn default_values() {
        let cfg = valid_config();
        assert_eq!(cfg.build.min_systems_per_sector, 10);
        assert_eq!(cfg.build.write_batch_size, 1000);
        assert_eq!(cfg.build.compression_level, 6);
        assert!((cfg.update.influence_threshold - 0.001).abs() < f64::EPSILON);
        assert!(cfg.store.compress);
        assert_eq!(
            cfg.store.sectors_path(),
            PathBuf::from("galaxy_db").join("galaxy_sectors_compressed")
        );
        assert_eq!(cfg.logging.level, LogLevel::Info);
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let mut cfg = valid_config();
        cfg.build.min_systems_per_sector = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("min_systems_per_sector must be at least 1"));
    }

    #[test]
    fn validate_rejects_small_read_buffer() {
        let mut cfg = valid_config();
        cfg.build.read_buffer_bytes = 1024;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("read_buffer_bytes"));
    }

    #[test]
    fn validate_rejects_influence_threshold_out_of_range() {
        for bad in [0.0, -0.5, 1.0, 2.0] {
            let mut cfg = valid_config();
            cfg.update.influence_threshold = bad;
            assert!(cfg.validate().is_err(), "threshold {} should be rejected", bad);
        }
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.build.write_batch_size = 0;
        cfg.build.compression_level = 12;
        cfg.store.data_dir = PathBuf::from("");
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("write_batch_size must be positive"));
        assert!(msg.contains("compression_level must be between 0 and 9, got 12"));
        assert!(msg.contains("data_dir must not be empty"));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[build]\nmin_systems_per_sector = 3\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.build.min_systems_per_sector, 3);
        assert_eq!(cfg.build.write_batch_size, 1000);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.store.data_dir, PathBuf::from("galaxy_db"));
    }

    #[test]
    fn toml_round_trip() {
        let cfg = valid_config();
        let text = cfg.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.build.work_batch_size, cfg.build.work_batch_size);
        assert_eq!(parsed.store.timeseries_dir, cfg.store.timeseries_dir);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.build.min_systems_per_sector, 10);
    }
}
