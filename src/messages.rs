//! Inbound GTFS-Realtime trip update model, in already-decoded form.
//!
//! The shapes mirror the `TripUpdate` message family of the GTFS-Realtime
//! feed spec, plus the `MODIFIED` trip schedule relationship extension that
//! replacement-pattern producers emit. Transport and protobuf decoding happen
//! upstream; batches arrive here as plain structs.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripUpdate {
    pub trip: TripDescriptor,
    pub stop_time_update: Vec<StopTimeUpdate>,
    /// Feed timestamp, POSIX seconds.
    pub timestamp: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripDescriptor {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    /// `HH:MM:SS` start time of the trip instance.
    pub start_time: Option<String>,
    /// `YYYYMMDD` service date of the trip instance.
    pub start_date: Option<String>,
    pub schedule_relationship: Option<TripScheduleRelationship>,
}

impl TripDescriptor {
    /// Relationship to the static schedule, defaulting to `Scheduled` when the
    /// producer left the field unset.
    pub fn schedule_relationship(&self) -> TripScheduleRelationship {
        self.schedule_relationship
            .unwrap_or(TripScheduleRelationship::Scheduled)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripScheduleRelationship {
    #[default]
    Scheduled,
    Added,
    Unscheduled,
    Canceled,
    /// Extension: the trip runs with a stop pattern differing from the static
    /// one (stops inserted or skipped).
    Modified,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopTimeUpdate {
    pub stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
    pub schedule_relationship: Option<StopScheduleRelationship>,
}

impl StopTimeUpdate {
    pub fn schedule_relationship(&self) -> StopScheduleRelationship {
        self.schedule_relationship
            .unwrap_or(StopScheduleRelationship::Scheduled)
    }

    pub fn is_skipped(&self) -> bool {
        self.schedule_relationship() == StopScheduleRelationship::Skipped
    }

    pub fn arrival_time(&self) -> Option<i64> {
        self.arrival.as_ref().and_then(|event| event.time)
    }

    pub fn departure_time(&self) -> Option<i64> {
        self.departure.as_ref().and_then(|event| event.time)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopScheduleRelationship {
    #[default]
    Scheduled,
    Skipped,
    NoData,
    Unscheduled,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopTimeEvent {
    /// Delay from the static schedule, seconds. Positive is late.
    pub delay: Option<i32>,
    /// Absolute event time, POSIX seconds.
    pub time: Option<i64>,
    pub uncertainty: Option<i32>,
}
