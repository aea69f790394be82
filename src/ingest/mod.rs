//! Streaming input of system records
//!
//! ```text
//! RecordSource (file | directory of fragments)
//!        │  open_stream(): magic-byte detection → gzip / bzip2 / plain
//!        ▼
//! RecordStream   one SystemRecord per line, malformed lines yielded as errors
//!        │  batches(n)
//!        ▼
//! RecordBatch    unit of work for one worker
//!        │  for_each_batch(): par_bridge (one file) or one task per file
//!        ▼
//! worker pool
//! ```

pub mod dispatch;
pub mod progress;
pub mod source;
pub mod stream;

pub use dispatch::for_each_batch;
pub use progress::{IngestProgress, IngestStats};
pub use source::{
    open_reader, open_stream, Compression, LineReader, RecordSource, SourceError, SourceFile,
    DEFAULT_READ_BUFFER,
};
pub use stream::{RecordBatch, RecordBatches, RecordStream};
