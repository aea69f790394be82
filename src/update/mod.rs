//! Incremental updates of a built sector store
//!
//! ```text
//! RecordSource ──► workers ──► SectorLocator (home sector)
//!                     │        SectorStateCache (stored version, per worker)
//!                     │        ChangeDetector
//!                     ▼
//!   change records ──► TimeSeriesWriter (systems/, stations/)
//!   changed systems ──► touched sectors rewritten atomically
//!                  └──► update_log.jsonl
//! ```

pub mod coordinator;
pub mod state;

pub use coordinator::{IncrementalUpdater, UpdateLogEntry, UpdateReport};
pub use state::{HomeSector, SectorLocator, SectorStateCache};
