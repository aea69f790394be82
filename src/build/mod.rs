//! Full sector store build
//!
//! ```text
//!   RecordSource ──► Pass 1 (pool) ──► standard ──► SectorBatcher ──► sector files
//!                        │                               + SectorStatistics
//!                        └────────► non-standard ──► SpillFile (per worker)
//!
//!   SectorStatistics ──► SectorCenters::resolve ──► prune small sectors
//!
//!   SpillFiles ──► Pass 2 (pool) ──► nearest center ──► sector files
//!                                                   └──► sector_index.json
//! ```

pub mod batcher;
pub mod coordinator;
pub mod spill;

pub use batcher::SectorBatcher;
pub use coordinator::{BuildMetadata, BuildReport, SectorBuilder};
pub use spill::{SpillFile, SpilledRecords};
