//! Line-oriented record streaming
//!
//! Accepts JSON Lines as well as JSON-array dumps written one object per line
//! (`[`, `{...},`, `{...}`, `]`). Malformed lines are yielded as errors and the
//! stream carries on; a read error ends the stream.

use super::source::SourceError;
use crate::types::SystemRecord;
use std::io::BufRead;

/// Iterator over the records of one input unit
pub struct RecordStream<R> {
    reader: R,
    unit: String,
    buf: Vec<u8>,
    line: u64,
    malformed: u64,
    bytes: u64,
    finished: bool,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R, unit: impl Into<String>) -> Self {
        Self {
            reader,
            unit: unit.into(),
            buf: Vec::with_capacity(16 * 1024),
            line: 0,
            malformed: 0,
            bytes: 0,
            finished: false,
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Lines read so far
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    /// Malformed lines skipped so far
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Decoded bytes consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Group the stream into batches of up to `size` records
    pub fn batches(self, size: usize) -> RecordBatches<R> {
        RecordBatches {
            stream: self,
            size: size.max(1),
            seq: 0,
        }
    }
}

/// Strip whitespace and JSON-array framing from a raw line
fn payload(line: &[u8]) -> &[u8] {
    let mut bytes = line.trim_ascii();
    if bytes == b"[" || bytes == b"]" {
        return &[];
    }
    if let Some(rest) = bytes.strip_suffix(b",") {
        bytes = rest.trim_ascii_end();
    }
    bytes
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = Result<SystemRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(n) => {
                    self.line += 1;
                    self.bytes += n as u64;

                    let text = payload(&self.buf);
                    if text.is_empty() {
                        continue;
                    }

                    return Some(match serde_json::from_slice::<SystemRecord>(text) {
                        Ok(record) => Ok(record),
                        Err(e) => {
                            self.malformed += 1;
                            Err(SourceError::Malformed {
                                unit: self.unit.clone(),
                                line: self.line,
                                message: e.to_string(),
                            })
                        }
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(SourceError::Read {
                        unit: self.unit.clone(),
                        source: e,
                    }));
                }
            }
        }
    }
}

/// A slice of input handed to one worker
#[derive(Debug, Default)]
pub struct RecordBatch {
    /// Unit identity for error reports, e.g. `galaxy.json.gz#12`
    pub unit: String,
    pub records: Vec<SystemRecord>,
    /// Lines in this batch that failed to decode
    pub malformed: u64,
    /// Set when the underlying reader failed while filling this batch
    pub failure: Option<String>,
}

/// Iterator over record batches
pub struct RecordBatches<R> {
    stream: RecordStream<R>,
    size: usize,
    seq: u64,
}

impl<R: BufRead> Iterator for RecordBatches<R> {
    type Item = RecordBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stream.finished {
            return None;
        }

        let mut batch = RecordBatch {
            unit: format!("{}#{}", self.stream.unit, self.seq),
            records: Vec::with_capacity(self.size),
            ..Default::default()
        };

        while batch.records.len() < self.size {
            match self.stream.next() {
                Some(Ok(record)) => batch.records.push(record),
                Some(Err(SourceError::Malformed { line, message, .. })) => {
                    tracing::warn!("Skipping malformed line {} in {}: {}", line, self.stream.unit, message);
                    batch.malformed += 1;
                }
                Some(Err(e)) => {
                    batch.failure = Some(e.to_string());
                    break;
                }
                None => break,
            }
        }

        if batch.records.is_empty() && batch.malformed == 0 && batch.failure.is_none() {
            return None;
        }
        self.seq += 1;
        Some(batch)
    }
}
