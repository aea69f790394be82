use super::run_cancellable;
use anyhow::{Context, Result};
use galaxy_sectors::{
    build::SectorBuilder,
    config::Config,
    ingest::{IngestProgress, RecordSource},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub async fn build_store(config: Config, input: PathBuf, quiet: bool) -> Result<()> {
    let source = RecordSource::open(&input)
        .with_context(|| format!("Failed to open input: {}", input.display()))?;

    info!(
        "Building sector store in {} from {} ({} file(s), {:.1} MB)",
        config.store.sectors_path().display(),
        input.display(),
        source.files().len(),
        source.total_bytes() as f64 / 1_000_000.0
    );

    let progress = Arc::new(IngestProgress::new("build", Some(source.total_bytes()), quiet));
    let builder = SectorBuilder::new(config.store.clone(), config.build.clone());

    let task_progress = Arc::clone(&progress);
    let report = run_cancellable(Arc::clone(&progress), move || {
        builder.build(&source, &task_progress)
    })
    .await?
    .context("Sector build failed")?;

    if !quiet {
        report.print_summary();
    }
    if report.cancelled {
        anyhow::bail!("Build cancelled; run it again to produce a complete store");
    }
    Ok(())
}
