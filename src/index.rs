//! Secondary indices keyed by bare local id.
//!
//! Trip updates name entities without the feed qualifier, so lookups here
//! ignore it (single static feed; a feed-qualified index can replace this
//! without touching the validators). Built lazily on first request and never
//! invalidated, the base graph being immutable once loaded.

use std::collections::HashMap;
use std::sync::Arc;

use compact_str::CompactString;
use log::warn;

use crate::graph::Graph;
use crate::model::{Route, Stop, Trip};

pub struct IdIndex {
    stops: HashMap<CompactString, Arc<Stop>>,
    routes: HashMap<CompactString, Arc<Route>>,
    trips: HashMap<CompactString, Arc<Trip>>,
}

impl IdIndex {
    pub(crate) fn build(graph: &Graph) -> Self {
        let mut stops = HashMap::new();
        for stop in graph.stops() {
            if stops.insert(stop.id.id.clone(), stop.clone()).is_some() {
                warn!("duplicate bare stop id {}, keeping the last one", stop.id);
            }
        }
        let mut routes = HashMap::new();
        for route in graph.routes() {
            if routes.insert(route.id.id.clone(), route.clone()).is_some() {
                warn!("duplicate bare route id {}, keeping the last one", route.id);
            }
        }
        let mut trips = HashMap::new();
        for trip in graph.trips() {
            if trips.insert(trip.id.id.clone(), trip.clone()).is_some() {
                warn!("duplicate bare trip id {}, keeping the last one", trip.id);
            }
        }
        Self {
            stops,
            routes,
            trips,
        }
    }

    pub fn stop(&self, id: &str) -> Option<&Arc<Stop>> {
        self.stops.get(id)
    }

    pub fn route(&self, id: &str) -> Option<&Arc<Route>> {
        self.routes.get(id)
    }

    pub fn trip(&self, id: &str) -> Option<&Arc<Trip>> {
        self.trips.get(id)
    }
}
