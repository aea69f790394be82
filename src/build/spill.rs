//! Overflow storage for non-standard records
//!
//! Records without a standard name cannot be placed until every sector center
//! is known, so the first pass spills them to a worker-private temp file in
//! the sectors directory. The file is deleted when its handle is dropped.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Worker-private spill file, created on first use
pub struct SpillFile {
    dir: PathBuf,
    writer: Option<(BufWriter<File>, TempPath)>,
    count: u64,
}

/// A finished spill file ready for the second pass
#[derive(Debug)]
pub struct SpilledRecords {
    pub path: TempPath,
    /// Records written to the file
    pub count: u64,
}

impl SpillFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: None,
            count: 0,
        }
    }

    fn writer(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            let (file, path) = tempfile::Builder::new()
                .prefix("non_standard_")
                .suffix(".spill")
                .tempfile_in(&self.dir)?
                .into_parts();
            self.writer = Some((BufWriter::with_capacity(1024 * 1024, file), path));
        }
        match self.writer.as_mut() {
            Some((writer, _)) => Ok(writer),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "spill file unavailable",
            )),
        }
    }

    /// Append a block of newline-terminated JSON lines holding `records` records
    pub fn write(&mut self, lines: &[u8], records: u64) -> std::io::Result<()> {
        if records == 0 {
            return Ok(());
        }
        self.writer()?.write_all(lines)?;
        self.count += records;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn path(&self) -> Option<&Path> {
        self.writer.as_ref().map(|(_, path)| path.as_ref())
    }

    /// Flush and hand over the file; `None` if nothing was spilled
    pub fn finish(self) -> std::io::Result<Option<SpilledRecords>> {
        let count = self.count;
        match self.writer {
            Some((mut writer, path)) => {
                writer.flush()?;
                Ok(Some(SpilledRecords { path, count }))
            }
            None => Ok(None),
        }
    }
}
