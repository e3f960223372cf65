//! Application of classified trip updates to the working buffer.
//!
//! Each handler validates everything that can fail before the first buffer
//! write, so a rejected update leaves no trace and the rest of the batch
//! proceeds on an intact buffer.

use std::sync::Arc;

use chrono::NaiveDate;
use compact_str::{CompactString, format_compact};
use log::debug;

use crate::cache::TripPatternCache;
use crate::calendar::{ServiceCode, service_date_start_seconds};
use crate::error::UpdateError;
use crate::graph::Graph;
use crate::messages::{StopTimeUpdate, TripDescriptor, TripUpdate};
use crate::model::{
    FeedScopedId, PickupDropOff, Route, Stop, StopTime, Timepoint, TransitMode, Trip,
};
use crate::pattern::StopPattern;
use crate::snapshot::TimetableSnapshot;
use crate::timetable::{MAX_SERVICE_DAY_SECONDS, TripTimes};
use crate::validate::check_new_stop_time_updates;

/// Agency recorded on routes synthesized for added trips.
const PLACEHOLDER_AGENCY: &str = "UNKNOWN";

/// Mutates the working buffer for the duration of one batch. Runs under the
/// writer lock.
pub(crate) struct TimetableUpdater<'a> {
    graph: &'a Graph,
    buffer: &'a mut TimetableSnapshot,
    cache: &'a mut TripPatternCache,
}

impl<'a> TimetableUpdater<'a> {
    pub fn new(
        graph: &'a Graph,
        buffer: &'a mut TimetableSnapshot,
        cache: &'a mut TripPatternCache,
    ) -> Self {
        Self {
            graph,
            buffer,
            cache,
        }
    }

    /// Retime of a trip on its static pattern.
    pub fn handle_scheduled_trip(
        &mut self,
        update: &TripUpdate,
        trip: &TripDescriptor,
        date: NaiveDate,
    ) -> Result<(), UpdateError> {
        let trip_id = required_trip_id(trip)?;
        let entity = self.resolve_trip(trip_id)?;
        let pattern = self
            .graph
            .pattern_for_trip(&entity.id)
            .ok_or_else(|| UpdateError::TripNotFound(trip_id.into()))?
            .clone();
        let day_start = self.day_start(date)?;
        let updated = pattern.scheduled_timetable().create_updated_trip_times(
            update,
            trip_id,
            pattern.stop_pattern(),
            day_start,
        )?;
        self.buffer.update(&pattern, updated, date)
    }

    pub fn cancel_scheduled_trip(
        &mut self,
        trip_id: &str,
        date: NaiveDate,
    ) -> Result<(), UpdateError> {
        let entity = self.resolve_trip(trip_id)?;
        let pattern = self
            .graph
            .pattern_for_trip(&entity.id)
            .ok_or_else(|| UpdateError::TripNotFound(trip_id.into()))?
            .clone();
        let timetable = pattern.scheduled_timetable();
        let mut times = (**timetable
            .trip_times_for_trip(trip_id)
            .ok_or_else(|| UpdateError::TripNotFound(trip_id.into()))?)
        .clone();
        times.cancel();
        self.buffer.update(&pattern, times, date)
    }

    /// Cancels the most recent realtime-added instance of a trip on a date.
    pub fn cancel_previously_added_trip(
        &mut self,
        trip_id: &str,
        date: NaiveDate,
    ) -> Result<(), UpdateError> {
        let pattern = self
            .buffer
            .last_added_trip_pattern(trip_id, date)
            .cloned()
            .ok_or_else(|| UpdateError::TripNotFound(trip_id.into()))?;
        let timetable = self.buffer.resolve(&pattern, date);
        let mut times = (**timetable
            .trip_times_for_trip(trip_id)
            .ok_or_else(|| UpdateError::TripNotFound(trip_id.into()))?)
        .clone();
        times.cancel();
        self.buffer.update(&pattern, times, date)
    }

    /// A cancellation may concern a static trip, a realtime-added one, or
    /// both; it succeeds when either side did.
    pub fn handle_canceled_trip(
        &mut self,
        trip: &TripDescriptor,
        date: NaiveDate,
    ) -> Result<(), UpdateError> {
        let trip_id = required_trip_id(trip)?;
        let scheduled = self.cancel_scheduled_trip(trip_id, date);
        let added = self.cancel_previously_added_trip(trip_id, date);
        scheduled.or(added)
    }

    pub fn handle_added_trip(
        &mut self,
        update: &TripUpdate,
        trip: &TripDescriptor,
        date: NaiveDate,
    ) -> Result<(), UpdateError> {
        let trip_id = required_trip_id(trip)?;
        if self.graph.index().trip(trip_id).is_some() {
            return Err(UpdateError::TripAlreadyExists(trip_id.into()));
        }
        if trip.start_date.is_none() {
            return Err(UpdateError::MissingStartDate);
        }
        let stops = check_new_stop_time_updates(&update.stop_time_update, self.graph.index())?;
        let stop_times = self.build_stop_times(&update.stop_time_update, &stops, date)?;

        let route = self.find_or_synthesize_route(trip, trip_id);
        let service_id = self
            .graph
            .service_ids_on_date(date)
            .into_iter()
            .next()
            .ok_or(UpdateError::NoServiceOnDate(date))?;
        let service_code = self
            .graph
            .service_code(&service_id)
            .ok_or_else(|| UpdateError::UnknownService(service_id.clone()))?;
        let entity = Arc::new(Trip {
            id: FeedScopedId::new(self.graph.feed_id(), trip_id),
            route,
            service_id,
            headsign: None,
        });

        // Everything fallible has passed; replace any earlier instance.
        if self.cancel_previously_added_trip(trip_id, date).is_ok() {
            debug!("canceled previously added instance of trip {trip_id} on {date}");
        }
        self.insert_trip(entity, &stop_times, service_code, date)
    }

    /// A known trip running a different stop pattern: the static instance is
    /// cancelled and the replacement added like a fresh trip.
    pub fn handle_modified_trip(
        &mut self,
        update: &TripUpdate,
        trip: &TripDescriptor,
        date: NaiveDate,
    ) -> Result<(), UpdateError> {
        let trip_id = required_trip_id(trip)?;
        let entity = self.resolve_trip(trip_id)?;
        if trip.start_date.is_none() {
            return Err(UpdateError::MissingStartDate);
        }
        if !self
            .graph
            .service(&entity.service_id)
            .is_some_and(|service| service.runs_on(date))
        {
            return Err(UpdateError::TripNotRunningOnDate(trip_id.into(), date));
        }
        let service_code = self
            .graph
            .service_code(&entity.service_id)
            .ok_or_else(|| UpdateError::UnknownService(entity.service_id.clone()))?;
        let stops = check_new_stop_time_updates(&update.stop_time_update, self.graph.index())?;
        let stop_times = self.build_stop_times(&update.stop_time_update, &stops, date)?;

        self.cancel_scheduled_trip(trip_id, date)?;
        if self.cancel_previously_added_trip(trip_id, date).is_ok() {
            debug!("canceled previously added instance of trip {trip_id} on {date}");
        }
        self.insert_trip(entity, &stop_times, service_code, date)
    }

    fn resolve_trip(&self, trip_id: &str) -> Result<Arc<Trip>, UpdateError> {
        self.graph
            .index()
            .trip(trip_id)
            .cloned()
            .ok_or_else(|| UpdateError::TripNotFound(trip_id.into()))
    }

    fn day_start(&self, date: NaiveDate) -> Result<i64, UpdateError> {
        service_date_start_seconds(self.graph.timezone(), date)
            .ok_or_else(|| UpdateError::InvalidStartDate(format_compact!("{date}")))
    }

    fn find_or_synthesize_route(&self, trip: &TripDescriptor, trip_id: &str) -> Arc<Route> {
        if let Some(route_id) = &trip.route_id
            && let Some(route) = self.graph.index().route(route_id)
        {
            return route.clone();
        }
        let local_id = trip.route_id.as_deref().unwrap_or(trip_id);
        debug!("synthesizing route {local_id} for added trip {trip_id}");
        Arc::new(Route {
            id: FeedScopedId::new(self.graph.feed_id(), local_id),
            mode: TransitMode::default(),
            agency: CompactString::from(PLACEHOLDER_AGENCY),
            short_name: None,
            long_name: Some(trip_id.to_owned()),
        })
    }

    /// Turns the non-skipped stop time updates into scheduled stop times for
    /// the service date. The trip cannot be boarded before its first stop or
    /// left at its last.
    fn build_stop_times(
        &self,
        updates: &[StopTimeUpdate],
        stops: &[Option<Arc<Stop>>],
        date: NaiveDate,
    ) -> Result<Vec<StopTime>, UpdateError> {
        let day_start = self.day_start(date)?;
        let mut stop_times = Vec::with_capacity(stops.len());
        for (position, (stu, stop)) in updates.iter().zip(stops).enumerate() {
            let Some(stop) = stop else {
                continue; // skipped hole
            };
            let arrival_epoch = stu
                .arrival_time()
                .or_else(|| stu.departure_time())
                .ok_or(UpdateError::MissingTime)?;
            let departure_epoch = stu
                .departure_time()
                .or_else(|| stu.arrival_time())
                .ok_or(UpdateError::MissingTime)?;

            let arrival = arrival_epoch - day_start;
            let departure = departure_epoch - day_start;
            for offset in [arrival, departure] {
                if !(0..=MAX_SERVICE_DAY_SECONDS as i64).contains(&offset) {
                    return Err(UpdateError::TimeOutOfRange(offset));
                }
            }

            stop_times.push(StopTime {
                stop: stop.clone(),
                stop_sequence: stu.stop_sequence.unwrap_or(position as u32 + 1),
                arrival: arrival as i32,
                departure: departure as i32,
                pickup: PickupDropOff::Regular,
                dropoff: PickupDropOff::Regular,
                timepoint: Timepoint::Exact,
            });
        }
        if stop_times.len() < 2 {
            return Err(UpdateError::TooFewStops);
        }
        if let Some(first) = stop_times.first_mut() {
            first.dropoff = PickupDropOff::NotAvailable;
        }
        if let Some(last) = stop_times.last_mut() {
            last.pickup = PickupDropOff::NotAvailable;
        }
        Ok(stop_times)
    }

    fn insert_trip(
        &mut self,
        entity: Arc<Trip>,
        stop_times: &[StopTime],
        service_code: ServiceCode,
        date: NaiveDate,
    ) -> Result<(), UpdateError> {
        let stop_pattern = StopPattern::from_stop_times(stop_times);
        let pattern = self
            .cache
            .get_or_create_trip_pattern(stop_pattern, &entity.route);
        if !pattern.runs_on(service_code) {
            pattern.add_service_code(service_code);
        }
        let times = TripTimes::from_stop_times(
            entity,
            stop_times,
            service_code,
            self.graph.deduplicator(),
        );
        self.buffer.update(&pattern, times, date)
    }
}

fn required_trip_id(trip: &TripDescriptor) -> Result<&str, UpdateError> {
    trip.trip_id.as_deref().ok_or(UpdateError::MissingTripId)
}
