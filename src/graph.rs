//! The static transit graph: base entities, patterns, calendars.
//!
//! A [`Graph`] is built once (from a static feed or programmatically) and
//! shared immutably with the snapshot source for its lifetime. The only
//! interior mutability is the array interner and the lazily built id index.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use compact_str::CompactString;
use fixedbitset::FixedBitSet;
use log::warn;

use crate::calendar::{Service, ServiceCode};
use crate::index::IdIndex;
use crate::model::{FeedScopedId, Route, Stop, StopTime, Trip};
use crate::pattern::{PatternId, StopPattern, TripPattern};
use crate::timetable::{Timetable, TripTimes};

/// Interns time and sequence arrays so identical trips share storage.
#[derive(Debug, Default)]
pub struct Deduplicator {
    int_arrays: Mutex<HashSet<Arc<[i32]>>>,
    sequence_arrays: Mutex<HashSet<Arc<[u32]>>>,
}

impl Deduplicator {
    pub fn int_array(&self, values: &[i32]) -> Arc<[i32]> {
        let mut arrays = self.int_arrays.lock().unwrap();
        if let Some(existing) = arrays.get(values) {
            return existing.clone();
        }
        let interned: Arc<[i32]> = Arc::from(values);
        arrays.insert(interned.clone());
        interned
    }

    pub fn sequence_array(&self, values: &[u32]) -> Arc<[u32]> {
        let mut arrays = self.sequence_arrays.lock().unwrap();
        if let Some(existing) = arrays.get(values) {
            return existing.clone();
        }
        let interned: Arc<[u32]> = Arc::from(values);
        arrays.insert(interned.clone());
        interned
    }
}

pub struct Graph {
    feed_id: CompactString,
    timezone: Tz,
    stops: HashMap<FeedScopedId, Arc<Stop>>,
    routes: HashMap<FeedScopedId, Arc<Route>>,
    trips: HashMap<FeedScopedId, Arc<Trip>>,
    patterns: Vec<Arc<TripPattern>>,
    pattern_for_trip: HashMap<FeedScopedId, Arc<TripPattern>>,
    services: HashMap<CompactString, Service>,
    service_codes: HashMap<CompactString, ServiceCode>,
    deduplicator: Deduplicator,
    index: OnceLock<IdIndex>,
}

impl Graph {
    pub fn builder(feed_id: impl Into<CompactString>, timezone: Tz) -> GraphBuilder {
        GraphBuilder::new(feed_id, timezone)
    }

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.deduplicator
    }

    pub fn stops(&self) -> impl Iterator<Item = &Arc<Stop>> {
        self.stops.values()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    pub fn trips(&self) -> impl Iterator<Item = &Arc<Trip>> {
        self.trips.values()
    }

    pub fn patterns(&self) -> &[Arc<TripPattern>] {
        &self.patterns
    }

    pub fn pattern_count(&self) -> u32 {
        self.patterns.len() as u32
    }

    pub fn pattern_for_trip(&self, trip_id: &FeedScopedId) -> Option<&Arc<TripPattern>> {
        self.pattern_for_trip.get(trip_id)
    }

    pub fn service(&self, service_id: &str) -> Option<&Service> {
        self.services.get(service_id)
    }

    pub fn service_code(&self, service_id: &str) -> Option<ServiceCode> {
        self.service_codes.get(service_id).copied()
    }

    /// Service ids running on a date, sorted, so "pick the first" is the
    /// lexicographic tie-break.
    pub fn service_ids_on_date(&self, date: NaiveDate) -> BTreeSet<CompactString> {
        self.services
            .iter()
            .filter(|(_, service)| service.runs_on(date))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Today's civil date in the graph's time zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Bare-id secondary index, built on first use and stable thereafter.
    pub fn index(&self) -> &IdIndex {
        self.index.get_or_init(|| IdIndex::build(self))
    }
}

pub struct GraphBuilder {
    feed_id: CompactString,
    timezone: Tz,
    stops: HashMap<FeedScopedId, Arc<Stop>>,
    routes: HashMap<FeedScopedId, Arc<Route>>,
    services: HashMap<CompactString, Service>,
    trips: Vec<(Arc<Trip>, Vec<StopTime>)>,
}

impl GraphBuilder {
    pub fn new(feed_id: impl Into<CompactString>, timezone: Tz) -> Self {
        Self {
            feed_id: feed_id.into(),
            timezone,
            stops: HashMap::new(),
            routes: HashMap::new(),
            services: HashMap::new(),
            trips: Vec::new(),
        }
    }

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    pub fn add_stop(&mut self, stop: Arc<Stop>) {
        self.stops.insert(stop.id.clone(), stop);
    }

    pub fn add_route(&mut self, route: Arc<Route>) {
        self.routes.insert(route.id.clone(), route);
    }

    pub fn add_service(&mut self, service_id: impl Into<CompactString>, service: Service) {
        self.services.insert(service_id.into(), service);
    }

    pub fn add_trip(&mut self, trip: Arc<Trip>, stop_times: Vec<StopTime>) {
        self.trips.push((trip, stop_times));
    }

    pub fn build(self) -> Graph {
        // Service codes in lexicographic id order, so codes are reproducible
        // across loads of the same feed.
        let mut service_ids: Vec<CompactString> = self.services.keys().cloned().collect();
        service_ids.sort();
        let service_codes: HashMap<CompactString, ServiceCode> = service_ids
            .iter()
            .enumerate()
            .map(|(code, id)| (id.clone(), ServiceCode(code as u32)))
            .collect();

        let deduplicator = Deduplicator::default();

        // Group trips by route and stop pattern, in first-seen order.
        let mut pattern_slots: HashMap<(FeedScopedId, StopPattern), usize> = HashMap::new();
        let mut groups: Vec<(StopPattern, Vec<(Arc<Trip>, Vec<StopTime>)>)> = Vec::new();
        for (trip, stop_times) in self.trips {
            if stop_times.is_empty() {
                warn!("trip {} has no stop times, dropping it", trip.id);
                continue;
            }
            let stop_pattern = StopPattern::from_stop_times(&stop_times);
            let key = (trip.route.id.clone(), stop_pattern.clone());
            let slot = *pattern_slots.entry(key).or_insert_with(|| {
                groups.push((stop_pattern, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push((trip, stop_times));
        }

        let mut patterns = Vec::with_capacity(groups.len());
        let mut pattern_for_trip = HashMap::new();
        let mut trips = HashMap::new();
        for (stop_pattern, members) in groups {
            let route = members[0].0.route.clone();
            let mut trip_times = Vec::with_capacity(members.len());
            let mut codes = FixedBitSet::with_capacity(service_ids.len());
            for (trip, stop_times) in &members {
                let Some(code) = service_codes.get(trip.service_id.as_str()).copied() else {
                    warn!(
                        "trip {} references unknown service {}, dropping it",
                        trip.id, trip.service_id
                    );
                    continue;
                };
                if codes.len() <= code.index() {
                    codes.grow(code.index() + 1);
                }
                codes.insert(code.index());
                trip_times.push(Arc::new(TripTimes::from_stop_times(
                    trip.clone(),
                    stop_times,
                    code,
                    &deduplicator,
                )));
            }
            if trip_times.is_empty() {
                continue;
            }
            let pattern = Arc::new(TripPattern::new(
                PatternId(patterns.len() as u32),
                route,
                stop_pattern,
                Arc::new(Timetable::new(trip_times)),
                codes,
                false,
            ));
            for (trip, _) in &members {
                pattern_for_trip.insert(trip.id.clone(), pattern.clone());
                trips.insert(trip.id.clone(), trip.clone());
            }
            patterns.push(pattern);
        }

        Graph {
            feed_id: self.feed_id,
            timezone: self.timezone,
            stops: self.stops,
            routes: self.routes,
            trips,
            patterns,
            pattern_for_trip,
            services: self.services,
            service_codes,
            deduplicator,
            index: OnceLock::new(),
        }
    }
}
