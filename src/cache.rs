//! Interning of realtime-created stop patterns.
//!
//! Added and modified trips define stop patterns the static graph does not
//! have. The cache maps each distinct [`StopPattern`] to one
//! [`TripPattern`], registering new patterns under their owning route. It is
//! only touched under the writer lock but outlives individual batches, so
//! repeated updates for the same replacement geometry keep hitting one
//! pattern.

use std::collections::HashMap;
use std::sync::Arc;

use crate::graph::Graph;
use crate::model::{FeedScopedId, Route};
use crate::pattern::{PatternId, StopPattern, TripPattern};
use crate::timetable::Timetable;

pub struct TripPatternCache {
    cache: HashMap<StopPattern, Arc<TripPattern>>,
    patterns_by_route: HashMap<FeedScopedId, Vec<Arc<TripPattern>>>,
    next_pattern_id: u32,
}

impl TripPatternCache {
    /// Pattern ids continue where the graph's static patterns end.
    pub fn new(graph: &Graph) -> Self {
        Self {
            cache: HashMap::new(),
            patterns_by_route: HashMap::new(),
            next_pattern_id: graph.pattern_count(),
        }
    }

    pub fn get_or_create_trip_pattern(
        &mut self,
        stop_pattern: StopPattern,
        route: &Arc<Route>,
    ) -> Arc<TripPattern> {
        if let Some(existing) = self.cache.get(&stop_pattern) {
            return existing.clone();
        }
        let pattern = Arc::new(TripPattern::new(
            PatternId(self.next_pattern_id),
            route.clone(),
            stop_pattern.clone(),
            Arc::new(Timetable::empty()),
            Default::default(),
            true,
        ));
        self.next_pattern_id += 1;
        self.patterns_by_route
            .entry(route.id.clone())
            .or_default()
            .push(pattern.clone());
        self.cache.insert(stop_pattern, pattern.clone());
        pattern
    }

    pub fn patterns_for_route(&self, route_id: &FeedScopedId) -> &[Arc<TripPattern>] {
        self.patterns_by_route
            .get(route_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
