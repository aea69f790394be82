use super::run_cancellable;
use anyhow::{Context, Result};
use galaxy_sectors::{
    config::Config,
    ingest::{IngestProgress, RecordSource},
    update::IncrementalUpdater,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub async fn update_store(config: Config, input: PathBuf, quiet: bool) -> Result<()> {
    let source = RecordSource::open(&input)
        .with_context(|| format!("Failed to open input: {}", input.display()))?;

    info!(
        "Applying {} to {} (influence threshold {})",
        input.display(),
        config.store.sectors_path().display(),
        config.update.influence_threshold
    );

    let progress = Arc::new(IngestProgress::new("update", Some(source.total_bytes()), quiet));
    let updater = IncrementalUpdater::new(
        config.store.clone(),
        config.build.clone(),
        config.update.clone(),
    );

    let task_progress = Arc::clone(&progress);
    let report = run_cancellable(Arc::clone(&progress), move || {
        updater.update(&source, &task_progress)
    })
    .await?
    .context("Incremental update failed")?;

    if !quiet {
        report.print_summary();
    }
    if report.cancelled {
        anyhow::bail!("Update cancelled; the store was left unchanged");
    }
    Ok(())
}
