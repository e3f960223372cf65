//! Classification of incoming trip updates.

use crate::messages::{TripScheduleRelationship, TripUpdate};

/// What an update means for the timetable, decided once per message before
/// validation and buffer mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TripUpdateType {
    /// Retime of a trip in the static timetable.
    Scheduled,
    /// A trip the static timetable does not know about.
    Added,
    /// Frequency-based trip without a schedule. Rejected downstream.
    Unscheduled,
    Canceled,
    /// A known trip running with a different stop pattern.
    Modified,
}

/// Maps a raw trip update to its [`TripUpdateType`].
///
/// The trip descriptor's own schedule relationship wins when present. A
/// nominally scheduled update that skips stops no longer fits the static stop
/// pattern, so it is promoted to `Modified` and flows through the
/// replacement-pattern pipeline.
// TODO: also promote on the stop-level ADDED relationship once the upstream
// extension defines it.
pub fn classify(update: &TripUpdate) -> TripUpdateType {
    let classified = match update.trip.schedule_relationship() {
        TripScheduleRelationship::Scheduled => TripUpdateType::Scheduled,
        TripScheduleRelationship::Added => TripUpdateType::Added,
        TripScheduleRelationship::Unscheduled => TripUpdateType::Unscheduled,
        TripScheduleRelationship::Canceled => TripUpdateType::Canceled,
        TripScheduleRelationship::Modified => TripUpdateType::Modified,
    };

    if classified == TripUpdateType::Scheduled
        && update.stop_time_update.iter().any(|stu| stu.is_skipped())
    {
        return TripUpdateType::Modified;
    }
    classified
}
