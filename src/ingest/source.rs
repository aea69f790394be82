//! Input sources for system records
//!
//! A source is either one large dump file or a directory of fragments. Each
//! file is decompressed transparently: compression is detected from the first
//! bytes of the file, not its extension.

use super::stream::RecordStream;
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Default read buffer (64 MiB)
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024 * 1024;

/// Errors that can occur while reading input
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Input not found: {0}")]
    NotFound(PathBuf),

    #[error("No input files in {0}")]
    Empty(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed reading {unit}: {source}")]
    Read {
        unit: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed record at {unit}:{line}: {message}")]
    Malformed {
        unit: String,
        line: u64,
        message: String,
    },
}

impl SourceError {
    /// Per-record errors are counted and skipped; everything else ends the unit
    pub fn is_malformed(&self) -> bool {
        matches!(self, SourceError::Malformed { .. })
    }
}

/// Compression of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    None,
}

impl Compression {
    /// Classify from leading magic bytes
    pub fn from_magic(head: &[u8]) -> Self {
        if head.starts_with(&[0x1f, 0x8b]) {
            Compression::Gzip
        } else if head.starts_with(b"BZh") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }

    /// Sniff the compression of a file on disk
    pub fn detect(path: &Path) -> Result<Self, SourceError> {
        let mut file = File::open(path)?;
        let mut head = [0u8; 3];
        let mut filled = 0;
        while filled < head.len() {
            match file.read(&mut head[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(Self::from_magic(&head[..filled]))
    }
}

/// One input file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Size on disk (compressed)
    pub size: u64,
}

impl SourceFile {
    /// Short name used in logs and error reports
    pub fn unit_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A set of input files producing system records
#[derive(Debug, Clone)]
pub struct RecordSource {
    root: PathBuf,
    files: Vec<SourceFile>,
}

impl RecordSource {
    /// Open a dump file or a directory of fragments.
    ///
    /// Directories are walked recursively; hidden files are ignored and
    /// fragments are processed in path order.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = path.as_ref().to_path_buf();
        if !root.exists() {
            return Err(SourceError::NotFound(root));
        }

        let mut files = Vec::new();
        if root.is_file() {
            let size = root.metadata()?.len();
            files.push(SourceFile {
                path: root.clone(),
                size,
            });
        } else {
            for entry in WalkDir::new(&root)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
            {
                let entry = entry.map_err(|e| {
                    SourceError::Io(e.into_io_error().unwrap_or_else(|| {
                        io::Error::new(io::ErrorKind::Other, "directory walk failed")
                    }))
                })?;
                if entry.file_type().is_file() {
                    files.push(SourceFile {
                        path: entry.path().to_path_buf(),
                        size: entry.metadata().map(|m| m.len()).unwrap_or(0),
                    });
                }
            }
            files.sort_by(|a, b| a.path.cmp(&b.path));
        }

        if files.is_empty() {
            return Err(SourceError::Empty(root));
        }

        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// A single file is split into record batches; many files are one task each
    pub fn is_single_file(&self) -> bool {
        self.files.len() == 1
    }

    /// Total on-disk size of all inputs
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Input paths as strings, for metadata
    pub fn describe(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| f.path.display().to_string())
            .collect()
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Reader that reports raw bytes consumed to a shared counter
struct CountingReader<R> {
    inner: R,
    counter: Option<Arc<AtomicU64>>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(ref counter) = self.counter {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
        Ok(n)
    }
}

/// Boxed decoded line reader
pub type LineReader = Box<dyn BufRead + Send>;

/// Open a file as a decompressed, buffered reader
pub fn open_reader(
    path: &Path,
    buffer_bytes: usize,
    counter: Option<Arc<AtomicU64>>,
) -> Result<LineReader, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }
    let compression = Compression::detect(path)?;
    let file = File::open(path)?;
    let raw = CountingReader {
        inner: file,
        counter,
    };

    // the raw side only needs a modest buffer; the big buffer sits on the
    // decoded side where line splitting happens
    let raw_buffer = buffer_bytes.clamp(4 * 1024, 4 * 1024 * 1024);
    let reader: LineReader = match compression {
        Compression::Gzip => Box::new(BufReader::with_capacity(
            buffer_bytes,
            MultiGzDecoder::new(BufReader::with_capacity(raw_buffer, raw)),
        )),
        Compression::Bzip2 => Box::new(BufReader::with_capacity(
            buffer_bytes,
            MultiBzDecoder::new(BufReader::with_capacity(raw_buffer, raw)),
        )),
        Compression::None => Box::new(BufReader::with_capacity(buffer_bytes, raw)),
    };
    Ok(reader)
}

/// Open a file as a stream of system records
pub fn open_stream(
    file: &SourceFile,
    buffer_bytes: usize,
    counter: Option<Arc<AtomicU64>>,
) -> Result<RecordStream<LineReader>, SourceError> {
    let reader = open_reader(&file.path, buffer_bytes, counter)?;
    Ok(RecordStream::new(reader, file.unit_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_magic_detection() {
        assert_eq!(Compression::from_magic(&[0x1f, 0x8b, 0x08]), Compression::Gzip);
        assert_eq!(Compression::from_magic(b"BZh91AY"), Compression::Bzip2);
        assert_eq!(Compression::from_magic(b"{\"id64\""), Compression::None);
        assert_eq!(Compression::from_magic(b""), Compression::None);
    }

    #[test]
    fn test_detection_ignores_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("misleading.json");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::fast());
        encoder.write_all(b"{}\n").unwrap();
        encoder.finish().unwrap();

        assert_eq!(Compression::detect(&path).unwrap(), Compression::Gzip);
    }

    #[test]
    fn test_bzip2_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.bin");
        let mut encoder = bzip2::write::BzEncoder::new(
            File::create(&path).unwrap(),
            bzip2::Compression::fast(),
        );
        encoder.write_all(b"line one\nline two\n").unwrap();
        encoder.finish().unwrap();

        let counter = Arc::new(AtomicU64::new(0));
        let mut reader = open_reader(&path, 8192, Some(counter.clone())).unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "line one\nline two\n");
        assert_eq!(counter.load(Ordering::Relaxed), path.metadata().unwrap().len());
    }

    #[test]
    fn test_open_directory_of_fragments() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.jsonl"), "{}\n").unwrap();
        std::fs::write(dir.path().join("a.jsonl"), "{}\n{}\n").unwrap();
        std::fs::write(dir.path().join(".hidden"), "junk").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.jsonl"), "{}\n").unwrap();

        let source = RecordSource::open(dir.path()).unwrap();
        let names: Vec<String> = source.files().iter().map(|f| f.unit_name()).collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl", "c.jsonl"]);
        assert!(!source.is_single_file());
        assert_eq!(source.total_bytes(), 9);
    }

    #[test]
    fn test_missing_and_empty_inputs() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            RecordSource::open(dir.path().join("nope")),
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            RecordSource::open(dir.path()),
            Err(SourceError::Empty(_))
        ));
    }
}
