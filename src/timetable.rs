//! Per-trip times and per-pattern timetables.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::calendar::ServiceCode;
use crate::error::UpdateError;
use crate::graph::Deduplicator;
use crate::messages::{StopScheduleRelationship, StopTimeUpdate, TripUpdate};
use crate::model::{StopTime, Trip};
use crate::pattern::StopPattern;

/// Stop times live in `[0, 48h]` from the service date start, so a service
/// day can stretch well past midnight.
pub const MAX_SERVICE_DAY_SECONDS: i32 = 48 * 3600;

/// Arrival and departure times of one trip along its pattern, in seconds from
/// the service date start.
///
/// The scheduled arrays are deduplicated and shared between identical trips;
/// the realtime arrays start out as clones of them and are replaced wholesale
/// when an update retimes the trip.
#[derive(Clone, Debug, PartialEq)]
pub struct TripTimes {
    trip: Arc<Trip>,
    stop_sequences: Arc<[u32]>,
    scheduled_arrivals: Arc<[i32]>,
    scheduled_departures: Arc<[i32]>,
    arrivals: Arc<[i32]>,
    departures: Arc<[i32]>,
    service_code: ServiceCode,
    canceled: bool,
}

impl TripTimes {
    pub fn from_stop_times(
        trip: Arc<Trip>,
        stop_times: &[StopTime],
        service_code: ServiceCode,
        deduplicator: &Deduplicator,
    ) -> Self {
        let arrivals: Vec<i32> = stop_times.iter().map(|st| st.arrival).collect();
        let departures: Vec<i32> = stop_times.iter().map(|st| st.departure).collect();
        let sequences: Vec<u32> = stop_times.iter().map(|st| st.stop_sequence).collect();

        let scheduled_arrivals = deduplicator.int_array(&arrivals);
        let scheduled_departures = deduplicator.int_array(&departures);

        Self {
            trip,
            stop_sequences: deduplicator.sequence_array(&sequences),
            arrivals: scheduled_arrivals.clone(),
            departures: scheduled_departures.clone(),
            scheduled_arrivals,
            scheduled_departures,
            service_code,
            canceled: false,
        }
    }

    pub fn trip(&self) -> &Arc<Trip> {
        &self.trip
    }

    pub fn num_stops(&self) -> usize {
        self.arrivals.len()
    }

    pub fn arrival(&self, stop: usize) -> i32 {
        self.arrivals[stop]
    }

    pub fn departure(&self, stop: usize) -> i32 {
        self.departures[stop]
    }

    pub fn scheduled_arrival(&self, stop: usize) -> i32 {
        self.scheduled_arrivals[stop]
    }

    pub fn scheduled_departure(&self, stop: usize) -> i32 {
        self.scheduled_departures[stop]
    }

    pub fn stop_sequence(&self, stop: usize) -> u32 {
        self.stop_sequences[stop]
    }

    pub fn service_code(&self) -> ServiceCode {
        self.service_code
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    /// Checks the realtime times: within the service day, non-decreasing at
    /// each stop and between consecutive stops.
    pub fn validate(&self) -> Result<(), UpdateError> {
        for stop in 0..self.num_stops() {
            let arrival = self.arrival(stop);
            let departure = self.departure(stop);
            for time in [arrival, departure] {
                if !(0..=MAX_SERVICE_DAY_SECONDS).contains(&time) {
                    return Err(UpdateError::TimeOutOfRange(time as i64));
                }
            }
            if arrival > departure {
                return Err(UpdateError::DecreasingTimes);
            }
            if stop + 1 < self.num_stops() && departure > self.arrival(stop + 1) {
                return Err(UpdateError::DecreasingTimes);
            }
        }
        Ok(())
    }
}

/// The times of every trip over one pattern, either the scheduled timetable
/// owned by the pattern or a realtime overlay for a single service date.
#[derive(Clone, Debug, Default)]
pub struct Timetable {
    trip_times: Vec<Arc<TripTimes>>,
    service_date: Option<NaiveDate>,
}

impl Timetable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(trip_times: Vec<Arc<TripTimes>>) -> Self {
        Self {
            trip_times,
            service_date: None,
        }
    }

    pub fn trip_times(&self) -> &[Arc<TripTimes>] {
        &self.trip_times
    }

    pub fn service_date(&self) -> Option<NaiveDate> {
        self.service_date
    }

    pub fn trip_times_for_trip(&self, trip_id: &str) -> Option<&Arc<TripTimes>> {
        self.trip_times
            .iter()
            .find(|times| times.trip().id.id == trip_id)
    }

    /// A copy of this timetable pinned to one service date, the seed of a
    /// realtime overlay.
    pub fn for_service_date(&self, date: NaiveDate) -> Self {
        Self {
            trip_times: self.trip_times.clone(),
            service_date: Some(date),
        }
    }

    /// Copy-on-write replacement of one trip's times (appending when the trip
    /// is new to this timetable, as for realtime-added patterns).
    pub fn with_updated_trip_times(&self, updated: Arc<TripTimes>) -> Self {
        let mut trip_times = self.trip_times.clone();
        match trip_times
            .iter()
            .position(|times| times.trip().id == updated.trip().id)
        {
            Some(at) => trip_times[at] = updated,
            None => trip_times.push(updated),
        }
        Self {
            trip_times,
            service_date: self.service_date,
        }
    }

    /// Layers a trip update's per-stop deltas onto the trip's scheduled
    /// baseline.
    ///
    /// A delta carries forward to later stops until the next explicit one; a
    /// NO_DATA entry resets the running delay to the schedule. Absolute event
    /// times are converted against `day_start` (epoch seconds of the service
    /// date start). Fails when an entry matches no pattern stop or the result
    /// violates time ordering.
    pub fn create_updated_trip_times(
        &self,
        update: &TripUpdate,
        trip_id: &str,
        stops: &StopPattern,
        day_start: i64,
    ) -> Result<TripTimes, UpdateError> {
        let base = self
            .trip_times_for_trip(trip_id)
            .ok_or_else(|| UpdateError::TripNotFound(trip_id.into()))?;

        let num_stops = base.num_stops();
        let mut arrivals = vec![0i32; num_stops];
        let mut departures = vec![0i32; num_stops];

        let mut updates = update.stop_time_update.iter().peekable();
        let mut arrival_delay = 0i32;
        let mut departure_delay = 0i32;

        for stop in 0..num_stops {
            let matched = updates
                .peek()
                .is_some_and(|stu| Self::matches_stop(stu, base, stops, stop));
            if matched {
                let stu = updates.next().expect("peeked entry");
                match stu.schedule_relationship() {
                    StopScheduleRelationship::Skipped => {
                        return Err(UpdateError::UnexpectedSkippedStop);
                    }
                    StopScheduleRelationship::NoData => {
                        arrival_delay = 0;
                        departure_delay = 0;
                    }
                    _ => {
                        arrival_delay = match &stu.arrival {
                            Some(event) => Self::delay_of(
                                event.time,
                                event.delay,
                                base.scheduled_arrival(stop),
                                day_start,
                            )
                            .unwrap_or(departure_delay),
                            None => departure_delay,
                        };
                        departure_delay = match &stu.departure {
                            Some(event) => Self::delay_of(
                                event.time,
                                event.delay,
                                base.scheduled_departure(stop),
                                day_start,
                            )
                            .unwrap_or(arrival_delay),
                            None => arrival_delay,
                        };
                    }
                }
            }
            arrivals[stop] = base.scheduled_arrival(stop) + arrival_delay;
            departures[stop] = base.scheduled_departure(stop) + departure_delay;
        }

        if updates.next().is_some() {
            // An entry named a stop or sequence the pattern does not have.
            return Err(UpdateError::StopMismatch);
        }

        let updated = TripTimes {
            trip: base.trip().clone(),
            stop_sequences: base.stop_sequences.clone(),
            scheduled_arrivals: base.scheduled_arrivals.clone(),
            scheduled_departures: base.scheduled_departures.clone(),
            arrivals: Arc::from(arrivals),
            departures: Arc::from(departures),
            service_code: base.service_code,
            canceled: false,
        };
        updated.validate()?;
        Ok(updated)
    }

    fn matches_stop(
        stu: &StopTimeUpdate,
        base: &TripTimes,
        stops: &StopPattern,
        stop: usize,
    ) -> bool {
        if let Some(sequence) = stu.stop_sequence {
            return sequence == base.stop_sequence(stop);
        }
        if let Some(stop_id) = &stu.stop_id {
            return stops.stops()[stop].stop.id.id.as_str() == stop_id.as_str();
        }
        false
    }

    fn delay_of(
        time: Option<i64>,
        delay: Option<i32>,
        scheduled: i32,
        day_start: i64,
    ) -> Option<i32> {
        if let Some(time) = time {
            return Some((time - day_start - scheduled as i64) as i32);
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{StopTimeEvent, TripDescriptor};
    use crate::testutil;

    const DAY_START: i64 = 1_705_276_800; // 2024-01-15 UTC

    fn base_timetable() -> (Timetable, StopPattern) {
        let route = testutil::route("R1");
        let trip = testutil::trip("T1", &route, "WK");
        let stop_times = testutil::t1_stop_times();
        let pattern = StopPattern::from_stop_times(&stop_times);
        let deduplicator = Deduplicator::default();
        let times = TripTimes::from_stop_times(trip, &stop_times, ServiceCode(0), &deduplicator);
        (Timetable::new(vec![Arc::new(times)]), pattern)
    }

    fn retime_update(stop_time_update: Vec<StopTimeUpdate>) -> TripUpdate {
        TripUpdate {
            trip: TripDescriptor {
                trip_id: Some("T1".to_owned()),
                start_date: Some("20240115".to_owned()),
                ..TripDescriptor::default()
            },
            stop_time_update,
            ..TripUpdate::default()
        }
    }

    fn delay_at(sequence: u32, delay: i32) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_sequence: Some(sequence),
            arrival: Some(StopTimeEvent {
                delay: Some(delay),
                ..StopTimeEvent::default()
            }),
            ..StopTimeUpdate::default()
        }
    }

    #[test]
    fn delay_applies_and_propagates() {
        let (timetable, pattern) = base_timetable();
        let update = retime_update(vec![delay_at(2, 120)]);
        let updated = timetable
            .create_updated_trip_times(&update, "T1", &pattern, DAY_START)
            .unwrap();

        // First stop untouched, second shifted, delta carried to the third.
        assert_eq!(updated.arrival(0), 8 * 3600);
        assert_eq!(updated.arrival(1), 8 * 3600 + 10 * 60 + 120);
        assert_eq!(updated.departure(1), 8 * 3600 + 11 * 60 + 120);
        assert_eq!(updated.arrival(2), 8 * 3600 + 20 * 60 + 120);
        assert!(updated.validate().is_ok());
    }

    #[test]
    fn absolute_times_convert_against_day_start() {
        let (timetable, pattern) = base_timetable();
        let update = retime_update(vec![StopTimeUpdate {
            stop_sequence: Some(2),
            arrival: Some(StopTimeEvent {
                time: Some(DAY_START + (8 * 3600 + 12 * 60) as i64),
                ..StopTimeEvent::default()
            }),
            ..StopTimeUpdate::default()
        }]);
        let updated = timetable
            .create_updated_trip_times(&update, "T1", &pattern, DAY_START)
            .unwrap();
        assert_eq!(updated.arrival(1), 8 * 3600 + 12 * 60);
    }

    #[test]
    fn no_data_resets_running_delay() {
        let (timetable, pattern) = base_timetable();
        let update = retime_update(vec![
            delay_at(1, 300),
            StopTimeUpdate {
                stop_sequence: Some(3),
                schedule_relationship: Some(StopScheduleRelationship::NoData),
                ..StopTimeUpdate::default()
            },
        ]);
        let updated = timetable
            .create_updated_trip_times(&update, "T1", &pattern, DAY_START)
            .unwrap();
        assert_eq!(updated.arrival(1), 8 * 3600 + 10 * 60 + 300);
        assert_eq!(updated.arrival(2), 8 * 3600 + 20 * 60);
    }

    #[test]
    fn matching_by_stop_id_works() {
        let (timetable, pattern) = base_timetable();
        let update = retime_update(vec![StopTimeUpdate {
            stop_id: Some("B".to_owned()),
            arrival: Some(StopTimeEvent {
                delay: Some(60),
                ..StopTimeEvent::default()
            }),
            ..StopTimeUpdate::default()
        }]);
        let updated = timetable
            .create_updated_trip_times(&update, "T1", &pattern, DAY_START)
            .unwrap();
        assert_eq!(updated.arrival(1), 8 * 3600 + 10 * 60 + 60);
    }

    #[test]
    fn unmatched_entry_fails() {
        let (timetable, pattern) = base_timetable();
        let update = retime_update(vec![delay_at(9, 120)]);
        assert_eq!(
            timetable.create_updated_trip_times(&update, "T1", &pattern, DAY_START),
            Err(UpdateError::StopMismatch)
        );
    }

    #[test]
    fn negative_delay_below_day_start_fails() {
        let (timetable, pattern) = base_timetable();
        let update = retime_update(vec![delay_at(1, -(9 * 3600))]);
        assert!(matches!(
            timetable.create_updated_trip_times(&update, "T1", &pattern, DAY_START),
            Err(UpdateError::TimeOutOfRange(_))
        ));
    }

    #[test]
    fn unknown_trip_fails() {
        let (timetable, pattern) = base_timetable();
        let update = retime_update(vec![delay_at(1, 60)]);
        assert_eq!(
            timetable.create_updated_trip_times(&update, "T9", &pattern, DAY_START),
            Err(UpdateError::TripNotFound("T9".into()))
        );
    }

    #[test]
    fn updating_replaces_by_trip_id_and_appends_new() {
        let (timetable, pattern) = base_timetable();
        let update = retime_update(vec![delay_at(2, 120)]);
        let updated = timetable
            .create_updated_trip_times(&update, "T1", &pattern, DAY_START)
            .unwrap();

        let replaced = timetable.with_updated_trip_times(Arc::new(updated));
        assert_eq!(replaced.trip_times().len(), 1);
        assert_eq!(
            replaced.trip_times_for_trip("T1").unwrap().arrival(1),
            8 * 3600 + 10 * 60 + 120
        );
        // The original is untouched.
        assert_eq!(
            timetable.trip_times_for_trip("T1").unwrap().arrival(1),
            8 * 3600 + 10 * 60
        );
    }
}
