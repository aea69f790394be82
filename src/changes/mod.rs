//! Change detection and the time-series change log
//!
//! ```text
//! old, new ──► fingerprint equal? ──yes──► unchanged
//!                    │ no
//!                    ▼
//!              category diffs ──► ChangeResult ──► change records ──► TimeSeriesWriter
//! ```

pub mod detector;
pub mod fingerprint;
pub mod records;
pub mod timeseries;

pub use detector::{
    ChangeDetector, ChangeKind, ChangeResult, InfluenceChange, PopulationChange, SetChange,
    StationChanges, StationRef, SystemChanges, ValueChange, DEFAULT_INFLUENCE_THRESHOLD,
};
pub use fingerprint::{station_fingerprint, system_fingerprint};
pub use records::{
    match_station, InfluenceDelta, StationChangeRecord, StationDelta, StationSnapshot,
    SystemChangeRecord, SystemDelta, SystemSnapshot, STATION_DISCOVERED, SYSTEM_DISCOVERED,
};
pub use timeseries::{partition_for, read_change_log, TimeSeriesWriter};
