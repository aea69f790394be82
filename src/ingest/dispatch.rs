//! Feeding record batches into the worker pool

use super::progress::IngestProgress;
use super::source::{open_stream, RecordSource};
use super::stream::RecordBatch;
use crate::types::WorkerError;
use rayon::prelude::*;
use tracing::debug;

/// Run `on_batch` for every batch of `source` on the current rayon pool.
///
/// A single input file is cut into `batch_size` batches bridged into the
/// pool; several files are processed one file per task. No new batch starts
/// once `progress` is cancelled. Files that cannot be opened are passed to
/// `on_error`.
pub fn for_each_batch<B, E>(
    source: &RecordSource,
    read_buffer: usize,
    batch_size: usize,
    progress: &IngestProgress,
    on_batch: B,
    on_error: E,
) where
    B: Fn(RecordBatch) + Send + Sync,
    E: Fn(WorkerError) + Send + Sync,
{
    if source.is_single_file() {
        let file = &source.files()[0];
        match open_stream(file, read_buffer, Some(progress.byte_counter())) {
            Ok(stream) => stream
                .batches(batch_size)
                .take_while(|_| !progress.is_cancelled())
                .par_bridge()
                .for_each(|batch| on_batch(batch)),
            Err(e) => on_error(WorkerError::new(file.unit_name(), e)),
        }
        return;
    }

    source.files().par_iter().for_each(|file| {
        if progress.is_cancelled() {
            return;
        }
        debug!("Processing {}", file.path.display());
        match open_stream(file, read_buffer, Some(progress.byte_counter())) {
            Ok(stream) => {
                for batch in stream.batches(batch_size) {
                    if progress.is_cancelled() {
                        break;
                    }
                    on_batch(batch);
                }
            }
            Err(e) => on_error(WorkerError::new(file.unit_name(), e)),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    fn line(id: u64) -> String {
        format!(
            "{{\"id64\":{},\"name\":\"S{}\",\"coords\":{{\"x\":0,\"y\":0,\"z\":0}}}}\n",
            id, id
        )
    }

    #[test]
    fn test_single_file_is_split_into_batches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.jsonl");
        fs::write(&path, (0..25).map(line).collect::<String>()).unwrap();

        let source = RecordSource::open(&path).unwrap();
        let progress = IngestProgress::new("test", None, true);
        let sizes = Mutex::new(Vec::new());
        for_each_batch(&source, 64 * 1024, 10, &progress, |b| sizes.lock().push(b.records.len()), |_| {});

        let mut sizes = sizes.into_inner();
        sizes.sort();
        assert_eq!(sizes, vec![5, 10, 10]);
    }

    #[test]
    fn test_fragments_and_cancellation() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jsonl"), line(1)).unwrap();
        fs::write(dir.path().join("b.jsonl"), line(2)).unwrap();
        let source = RecordSource::open(dir.path()).unwrap();

        let progress = IngestProgress::new("test", None, true);
        let seen = Mutex::new(0);
        for_each_batch(&source, 64 * 1024, 10, &progress, |b| *seen.lock() += b.records.len(), |_| {});
        assert_eq!(*seen.lock(), 2);

        progress.cancel();
        let after_cancel = Mutex::new(0);
        for_each_batch(&source, 64 * 1024, 10, &progress, |_| *after_cancel.lock() += 1, |_| {});
        assert_eq!(*after_cancel.lock(), 0);
    }
}
