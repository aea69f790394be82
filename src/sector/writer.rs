//! Sector file writer
//!
//! Appends are written as complete gzip members, so a sector file is a
//! concatenation of independently compressed batches that any multi-member
//! gzip reader decodes as one stream. Compression happens before the
//! per-file lock is taken; the lock only covers the `write_all`.

use super::naming::sanitize_filename;
use super::StoreError;
use dashmap::DashMap;
use flate2::write::GzEncoder;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// On-disk encoding of sector files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorFormat {
    /// `.jsonl.gz`, gzip level 0-9
    Gzip { level: u32 },
    /// `.jsonl`
    Plain,
}

impl SectorFormat {
    /// Format from the store settings
    pub fn from_settings(compress: bool, level: u32) -> Self {
        if compress {
            SectorFormat::Gzip { level: level.min(9) }
        } else {
            SectorFormat::Plain
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SectorFormat::Gzip { .. } => "jsonl.gz",
            SectorFormat::Plain => "jsonl",
        }
    }

    /// Encode a block of JSON lines as one appendable unit
    pub fn encode(&self, lines: &[u8]) -> io::Result<Vec<u8>> {
        match *self {
            SectorFormat::Gzip { level } => {
                let mut encoder = GzEncoder::new(
                    Vec::with_capacity(lines.len() / 4),
                    flate2::Compression::new(level.min(9)),
                );
                encoder.write_all(lines)?;
                encoder.finish()
            }
            SectorFormat::Plain => Ok(lines.to_vec()),
        }
    }

    /// Format implied by an existing file name; gzip keeps this format's level
    pub fn matching(&self, file_name: &str) -> SectorFormat {
        if file_name.ends_with(".jsonl.gz") {
            match *self {
                SectorFormat::Gzip { .. } => *self,
                SectorFormat::Plain => SectorFormat::default(),
            }
        } else if file_name.ends_with(".jsonl") {
            SectorFormat::Plain
        } else {
            *self
        }
    }
}

impl Default for SectorFormat {
    fn default() -> Self {
        SectorFormat::Gzip { level: 6 }
    }
}

/// Concurrent writer for one sectors directory
pub struct SectorWriter {
    dir: PathBuf,
    format: SectorFormat,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SectorWriter {
    pub fn new(dir: impl Into<PathBuf>, format: SectorFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> SectorFormat {
        self.format
    }

    /// File name for a sector
    pub fn file_name(&self, sector: &str) -> String {
        format!("{}.{}", sanitize_filename(sector), self.format.extension())
    }

    pub fn path_for(&self, sector: &str) -> PathBuf {
        self.dir.join(self.file_name(sector))
    }

    fn lock_for(&self, file_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(file_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append newline-terminated JSON lines to a sector file, creating it if absent
    pub fn append(&self, sector: &str, lines: &[u8]) -> Result<(), StoreError> {
        if lines.is_empty() {
            return Ok(());
        }
        let encoded = self.format.encode(lines)?;
        let file_name = self.file_name(sector);
        let path = self.dir.join(&file_name);

        let lock = self.lock_for(&file_name);
        let _guard = lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Replace a sector file's entire contents atomically
    pub fn rewrite(&self, sector: &str, lines: &[u8]) -> Result<(), StoreError> {
        self.rewrite_file(&self.file_name(sector), lines)
    }

    /// Replace a file of this directory by name, encoded as its extension says
    pub fn rewrite_file(&self, file_name: &str, lines: &[u8]) -> Result<(), StoreError> {
        let encoded = self.format.matching(file_name).encode(lines)?;

        let lock = self.lock_for(file_name);
        let _guard = lock.lock();
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.dir.join(file_name))?;
        debug!("Rewrote sector file {}", file_name);
        Ok(())
    }

    /// Delete a sector's file. Returns whether a file was removed.
    pub fn remove(&self, sector: &str) -> Result<bool, StoreError> {
        let file_name = self.file_name(sector);
        let lock = self.lock_for(&file_name);
        let _guard = lock.lock();
        match fs::remove_file(self.dir.join(&file_name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every sector file (either encoding) from the directory.
    ///
    /// Used before a full rebuild so stale sectors cannot leak into the new
    /// store through append.
    pub fn clear(&self) -> Result<usize, StoreError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if is_sector_file(&path) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Whether a path looks like a sector file
pub fn is_sector_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".jsonl.gz") || n.ends_with(".jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_gz(path: &Path) -> String {
        let mut out = String::new();
        MultiGzDecoder::new(fs::File::open(path).unwrap())
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_appends_concatenate() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::Gzip { level: 6 });

        writer.append("Eol Prou", b"{\"a\":1}\n").unwrap();
        writer.append("Eol Prou", b"{\"a\":2}\n{\"a\":3}\n").unwrap();

        let path = writer.path_for("Eol Prou");
        assert_eq!(path.file_name().unwrap(), "Eol_Prou.jsonl.gz");
        assert_eq!(read_gz(&path), "{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");
    }

    #[test]
    fn test_plain_format() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::Plain);
        writer.append("A", b"x\n").unwrap();
        writer.append("A", b"y\n").unwrap();
        let content = fs::read_to_string(dir.path().join("A.jsonl")).unwrap();
        assert_eq!(content, "x\ny\n");
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::default());
        writer.append("A", b"old\n").unwrap();
        writer.rewrite("A", b"new\n").unwrap();
        assert_eq!(read_gz(&writer.path_for("A")), "new\n");
    }

    #[test]
    fn test_rewrite_file_follows_extension() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::default());
        writer.rewrite_file("Old.jsonl", b"plain\n").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("Old.jsonl")).unwrap(), "plain\n");

        let plain = SectorWriter::new(dir.path(), SectorFormat::Plain);
        plain.rewrite_file("New.jsonl.gz", b"packed\n").unwrap();
        assert_eq!(read_gz(&dir.path().join("New.jsonl.gz")), "packed\n");
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::default());
        writer.append("A", b"1\n").unwrap();
        writer.append("B", b"1\n").unwrap();
        fs::write(dir.path().join("sector_index.json"), "{}").unwrap();

        assert!(writer.remove("A").unwrap());
        assert!(!writer.remove("A").unwrap());
        assert_eq!(writer.clear().unwrap(), 1);
        assert!(dir.path().join("sector_index.json").exists());
    }

    #[test]
    fn test_concurrent_appends_same_sector() {
        use rayon::prelude::*;

        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::default());
        (0..64).into_par_iter().for_each(|i| {
            let line = format!("{{\"n\":{}}}\n", i);
            writer.append("Shared", line.as_bytes()).unwrap();
        });

        let content = read_gz(&writer.path_for("Shared"));
        let mut seen: Vec<u32> = content
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["n"].as_u64().unwrap() as u32)
            .collect();
        seen.sort();
        assert_eq!(seen, (0..64).collect::<Vec<_>>());
    }
}
