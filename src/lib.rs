//! Realtime transit timetable engine.
//!
//! Ingests GTFS-Realtime trip updates and maintains a consistent,
//! snapshotable view of an immutable scheduled timetable overlaid with
//! realtime changes: retimes, cancellations, added trips and replacement
//! stop patterns. A single producer applies update batches under a fair
//! writer lock; route planners read immutable published snapshots and never
//! observe a torn or partially applied update.

pub mod cache;
pub mod calendar;
pub mod classify;
pub mod error;
mod gc;
pub mod graph;
pub mod index;
pub mod messages;
pub mod model;
pub mod pattern;
pub mod snapshot;
pub mod source;
pub mod static_data;
pub mod timetable;
mod updater;
pub mod validate;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::UpdateError;
pub use graph::{Graph, GraphBuilder};
pub use messages::TripUpdate;
pub use snapshot::TimetableSnapshot;
pub use source::{
    FuzzyTripMatcher, SnapshotSourceConfig, TimetableSnapshotSource, UpdateSummary,
};
