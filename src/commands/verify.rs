use anyhow::{Context, Result};
use galaxy_sectors::{
    build::BuildMetadata,
    config::Config,
    sector::{verify, SectorIndex},
    update::UpdateLogEntry,
};
use tracing::info;

pub async fn verify_store(config: Config, sample: usize) -> Result<()> {
    let sectors_dir = config.store.sectors_path();
    info!("Verifying {}", sectors_dir.display());

    let report = verify(&sectors_dir, sample)
        .with_context(|| format!("Cannot verify {}", sectors_dir.display()))?;

    println!("\nSector Store Verification");
    println!("=========================");
    println!("Sectors directory:   {}", sectors_dir.display());
    println!("Sector files:        {}", report.total_sector_files);
    println!("Sampled files:       {}", report.sampled_files);
    println!("Sample systems:      {}", report.sample_systems);
    println!("Sample stations:     {}", report.sample_stations);
    println!("Malformed lines:     {}", report.malformed_lines);

    if let Ok(index) = SectorIndex::load(&sectors_dir) {
        println!("Indexed sectors:     {}", index.len());
        println!("Indexed systems:     {}", index.total_systems());
        println!("Index created:       {}", index.metadata.created_at);
    }

    if let Ok(metadata) = BuildMetadata::load(&config.store.build_metadata_path()) {
        println!("\nLast build:          {}", metadata.build_time);
        println!("  duration:          {:.1}s", metadata.build_duration_seconds);
        println!(
            "  size:              {:.1} MB -> {:.1} MB ({:.1}% savings)",
            metadata.source_size_mb, metadata.compressed_size_mb, metadata.compression_ratio_percent
        );
    }

    if let Ok(entries) = UpdateLogEntry::read_all(&config.store.update_log_path()) {
        if let Some(last) = entries.last() {
            println!("\nUpdates applied:     {}", entries.len());
            println!(
                "Last update:         {} ({} changed, {} discovered)",
                last.update_time, last.systems_changed, last.systems_discovered
            );
        }
    }

    for (file, reason) in &report.corrupt_files {
        println!("  corrupt: {} ({})", file, reason);
    }
    for sector in &report.missing_files {
        println!("  missing file for sector: {}", sector);
    }
    for error in &report.errors {
        println!("  error: {}", error);
    }

    if report.is_valid() {
        println!("\nStatus: VALID");
        Ok(())
    } else {
        anyhow::bail!("Sector store is invalid")
    }
}
