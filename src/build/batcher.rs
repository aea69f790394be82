//! Per-worker sector write buffers
//!
//! Serialized lines are grouped per sector and flushed to the sector file once
//! a sector reaches the batch size, which bounds memory independently of the
//! input size.

use crate::sector::{SectorWriter, StoreError};
use std::collections::HashMap;

#[derive(Default)]
struct SectorBuffer {
    lines: Vec<u8>,
    records: usize,
}

/// Buffers pending appends per sector
pub struct SectorBatcher {
    buffers: HashMap<String, SectorBuffer>,
    batch_size: usize,
    flushed_records: u64,
}

impl SectorBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            batch_size: batch_size.max(1),
            flushed_records: 0,
        }
    }

    /// Buffer one serialized record without writing anything
    pub fn stage(&mut self, sector: &str, line: &[u8]) {
        if !self.buffers.contains_key(sector) {
            self.buffers.insert(sector.to_string(), SectorBuffer::default());
        }
        let Some(buffer) = self.buffers.get_mut(sector) else {
            return;
        };
        buffer.lines.extend_from_slice(line);
        buffer.records += 1;
    }

    /// Queue one serialized record, flushing the sector if its buffer is full
    pub fn push(&mut self, writer: &SectorWriter, sector: &str, line: &[u8]) -> Result<(), StoreError> {
        self.stage(sector, line);
        match self.buffers.get_mut(sector) {
            Some(buffer) if buffer.records >= self.batch_size => {
                Self::flush_buffer(writer, sector, buffer, &mut self.flushed_records)
            }
            _ => Ok(()),
        }
    }

    /// Write out every buffer that reached the batch size.
    ///
    /// A buffer whose append fails keeps its lines for the next flush.
    pub fn flush_full(&mut self, writer: &SectorWriter) -> Result<(), StoreError> {
        let batch_size = self.batch_size;
        let mut first_error = None;
        for (sector, buffer) in self.buffers.iter_mut() {
            if buffer.records < batch_size {
                continue;
            }
            if let Err(e) = Self::flush_buffer(writer, sector, buffer, &mut self.flushed_records) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush_buffer(
        writer: &SectorWriter,
        sector: &str,
        buffer: &mut SectorBuffer,
        flushed: &mut u64,
    ) -> Result<(), StoreError> {
        writer.append(sector, &buffer.lines)?;
        *flushed += buffer.records as u64;
        buffer.lines.clear();
        buffer.records = 0;
        Ok(())
    }

    /// Flush every non-empty buffer
    pub fn flush_all(&mut self, writer: &SectorWriter) -> Result<(), StoreError> {
        for (sector, buffer) in self.buffers.iter_mut() {
            if buffer.records == 0 {
                continue;
            }
            Self::flush_buffer(writer, sector, buffer, &mut self.flushed_records)?;
        }
        // release memory held by sectors that went quiet
        self.buffers.clear();
        Ok(())
    }

    /// Records waiting in buffers
    pub fn pending(&self) -> usize {
        self.buffers.values().map(|b| b.records).sum()
    }

    /// Records written out so far
    pub fn flushed(&self) -> u64 {
        self.flushed_records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::SectorFormat;
    use tempfile::TempDir;

    #[test]
    fn test_flush_at_batch_size() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::Plain);
        let mut batcher = SectorBatcher::new(2);

        batcher.push(&writer, "A", b"1\n").unwrap();
        assert!(!writer.path_for("A").exists());
        batcher.push(&writer, "A", b"2\n").unwrap();
        assert_eq!(std::fs::read_to_string(writer.path_for("A")).unwrap(), "1\n2\n");

        batcher.push(&writer, "A", b"3\n").unwrap();
        batcher.push(&writer, "B", b"x\n").unwrap();
        assert_eq!(batcher.pending(), 2);

        batcher.flush_all(&writer).unwrap();
        assert_eq!(batcher.pending(), 0);
        assert_eq!(batcher.flushed(), 4);
        assert_eq!(std::fs::read_to_string(writer.path_for("A")).unwrap(), "1\n2\n3\n");
        assert_eq!(std::fs::read_to_string(writer.path_for("B")).unwrap(), "x\n");
    }

    #[test]
    fn test_stage_defers_writes_until_flush() {
        let dir = TempDir::new().unwrap();
        let writer = SectorWriter::new(dir.path(), SectorFormat::Plain);
        let mut batcher = SectorBatcher::new(2);

        batcher.stage("A", b"1\n");
        batcher.stage("A", b"2\n");
        batcher.stage("B", b"x\n");
        assert!(!writer.path_for("A").exists());
        assert_eq!(batcher.pending(), 3);

        batcher.flush_full(&writer).unwrap();
        assert_eq!(std::fs::read_to_string(writer.path_for("A")).unwrap(), "1\n2\n");
        assert!(!writer.path_for("B").exists());
        assert_eq!(batcher.pending(), 1);
        assert_eq!(batcher.flushed(), 2);
    }
}
