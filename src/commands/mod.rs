pub mod build;
pub mod init;
pub mod sectors;
pub mod update;
pub mod verify;

use anyhow::Result;
use galaxy_sectors::ingest::IngestProgress;
use std::sync::Arc;
use tracing::warn;

/// Run blocking pipeline work off the async runtime.
///
/// Ctrl-C cancels the run through `progress`; the work then drains its
/// in-flight batches and returns normally.
pub async fn run_cancellable<T, F>(progress: Arc<IngestProgress>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let mut task = tokio::task::spawn_blocking(work);
    tokio::select! {
        result = &mut task => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, finishing in-flight batches");
            progress.cancel();
            Ok(task.await?)
        }
    }
}
