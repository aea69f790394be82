//! Galaxy Sectors: build and maintain a sector-partitioned galaxy database

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use galaxy_sectors::config::{Config, LogFormat, LogLevel, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "galaxy-sectors")]
#[command(about = "Sector-partitioned galaxy database builder with incremental change tracking")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Worker threads (overrides the config for build and update)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (no progress output)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the sector store from a full galaxy dump (replaces any existing store)
    Build {
        /// Dump file or directory of dump fragments
        input: PathBuf,

        /// Minimum standard systems for a sector to be kept
        #[arg(long)]
        min_systems: Option<u64>,
    },

    /// Apply an incremental dump to an existing store
    Update {
        /// Dump file or directory of dump fragments
        input: PathBuf,

        /// Minimum faction influence change to report
        #[arg(long)]
        influence_threshold: Option<f64>,
    },

    /// Check sector files and the sector index
    Verify {
        /// Number of sector files to decode in full
        #[arg(short, long, default_value = "10")]
        sample: usize,
    },

    /// List sectors near a point
    Sectors {
        /// X coordinate (light years)
        #[arg(allow_hyphen_values = true)]
        x: f64,
        /// Y coordinate (light years)
        #[arg(allow_hyphen_values = true)]
        y: f64,
        /// Z coordinate (light years)
        #[arg(allow_hyphen_values = true)]
        z: f64,

        /// Search radius (light years)
        #[arg(short, long, default_value = "1000")]
        radius: f64,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (defaults when the file is absent)
    let mut config = Config::load_or_default(&cli.config)?;

    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }
    if let Some(workers) = cli.workers {
        config.build.workers = workers;
        config.update.workers = workers;
    }

    // Setup logging
    let level = LogLevel::from_verbosity(cli.verbose).unwrap_or(config.logging.level);
    let builder = FmtSubscriber::builder()
        .with_max_level(level.as_tracing())
        .with_target(false);
    match config.logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }
    tracing::debug!("Log level {}, config {}", level, cli.config.display());

    match cli.command {
        Commands::Build { input, min_systems } => {
            if let Some(min_systems) = min_systems {
                config.build.min_systems_per_sector = min_systems;
            }
            config.validate()?;
            commands::build::build_store(config, input, cli.quiet).await
        }
        Commands::Update {
            input,
            influence_threshold,
        } => {
            if let Some(threshold) = influence_threshold {
                config.update.influence_threshold = threshold;
            }
            config.validate()?;
            commands::update::update_store(config, input, cli.quiet).await
        }
        Commands::Verify { sample } => commands::verify::verify_store(config, sample).await,
        Commands::Sectors {
            x,
            y,
            z,
            radius,
            format,
        } => commands::sectors::list_sectors(config, x, y, z, radius, format).await,
        Commands::Init { path } => commands::init::init_config(path).await,
    }
}
