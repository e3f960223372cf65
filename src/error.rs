use chrono::NaiveDate;
use compact_str::CompactString;
use thiserror::Error;

/// Why a single trip update could not be applied.
///
/// Every variant is local to one update: the offending message is logged and
/// skipped, the rest of the batch continues and the buffer stays consistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("trip update has no trip id")]
    MissingTripId,
    #[error("trip update has no start date")]
    MissingStartDate,
    #[error("invalid start date `{0}`")]
    InvalidStartDate(CompactString),
    #[error("trip `{0}` is not in the timetable")]
    TripNotFound(CompactString),
    #[error("trip `{0}` already exists, refusing to add it again")]
    TripAlreadyExists(CompactString),
    #[error("stop `{0}` is not in the timetable")]
    StopNotFound(CompactString),
    #[error("stop time update without a stop id")]
    MissingStopId,
    #[error("trip update has fewer than two stops")]
    TooFewStops,
    #[error("stop sequences are not non-decreasing")]
    DecreasingStopSequence,
    #[error("stop times are not non-decreasing")]
    DecreasingTimes,
    #[error("stop time update has no usable arrival or departure time")]
    MissingTime,
    #[error("stop time {0}s is outside the service day")]
    TimeOutOfRange(i64),
    #[error("no service runs on {0}")]
    NoServiceOnDate(NaiveDate),
    #[error("trip `{0}` does not run on {1}")]
    TripNotRunningOnDate(CompactString, NaiveDate),
    #[error("service `{0}` has no service code")]
    UnknownService(CompactString),
    #[error("stop time update could not be matched to a pattern stop")]
    StopMismatch,
    #[error("skipped stop in a scheduled trip update")]
    UnexpectedSkippedStop,
    #[error("unscheduled trips are not supported")]
    UnscheduledNotSupported,
    #[error("snapshot is committed and read-only")]
    ReadOnlySnapshot,
}
