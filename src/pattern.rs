//! Stop patterns and trip patterns.
//!
//! A [`StopPattern`] is the interning key: the ordered stops a trip traverses
//! with their boarding policies, compared structurally. A [`TripPattern`]
//! owns the scheduled timetable for that geometry and a bitset of service
//! codes it runs on. Published patterns are shared with reader threads, so
//! the bitset only ever changes by copy-on-write replacement.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arc_swap::ArcSwap;
use fixedbitset::FixedBitSet;

use crate::calendar::ServiceCode;
use crate::model::{PickupDropOff, Route, Stop, StopTime};
use crate::timetable::Timetable;

/// Dense index of a trip pattern. Static patterns get the low ids at graph
/// load, realtime-created patterns continue the sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatternId(pub(crate) u32);

#[derive(Clone, Debug)]
pub struct PatternStop {
    pub stop: Arc<Stop>,
    pub pickup: PickupDropOff,
    pub dropoff: PickupDropOff,
}

#[derive(Clone, Debug, Default)]
pub struct StopPattern {
    stops: Vec<PatternStop>,
}

impl StopPattern {
    pub fn new(stops: Vec<PatternStop>) -> Self {
        Self { stops }
    }

    pub fn from_stop_times(stop_times: &[StopTime]) -> Self {
        Self {
            stops: stop_times
                .iter()
                .map(|st| PatternStop {
                    stop: st.stop.clone(),
                    pickup: st.pickup,
                    dropoff: st.dropoff,
                })
                .collect(),
        }
    }

    pub fn stops(&self) -> &[PatternStop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

// Structural equality over stop ids and policies; entity instances do not
// matter, two patterns visiting the same stops the same way are one pattern.
impl PartialEq for StopPattern {
    fn eq(&self, other: &Self) -> bool {
        self.stops.len() == other.stops.len()
            && self.stops.iter().zip(&other.stops).all(|(a, b)| {
                a.stop.id == b.stop.id && a.pickup == b.pickup && a.dropoff == b.dropoff
            })
    }
}

impl Eq for StopPattern {}

impl Hash for StopPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stops.len().hash(state);
        for pattern_stop in &self.stops {
            pattern_stop.stop.id.hash(state);
            pattern_stop.pickup.hash(state);
            pattern_stop.dropoff.hash(state);
        }
    }
}

#[derive(Debug)]
pub struct TripPattern {
    id: PatternId,
    route: Arc<Route>,
    stop_pattern: StopPattern,
    scheduled_timetable: Arc<Timetable>,
    service_codes: ArcSwap<FixedBitSet>,
    created_by_realtime: bool,
}

impl TripPattern {
    pub fn new(
        id: PatternId,
        route: Arc<Route>,
        stop_pattern: StopPattern,
        scheduled_timetable: Arc<Timetable>,
        service_codes: FixedBitSet,
        created_by_realtime: bool,
    ) -> Self {
        Self {
            id,
            route,
            stop_pattern,
            scheduled_timetable,
            service_codes: ArcSwap::from_pointee(service_codes),
            created_by_realtime,
        }
    }

    pub fn id(&self) -> PatternId {
        self.id
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn stop_pattern(&self) -> &StopPattern {
        &self.stop_pattern
    }

    /// The immutable timetable from the static feed. Empty for
    /// realtime-created patterns.
    pub fn scheduled_timetable(&self) -> Arc<Timetable> {
        self.scheduled_timetable.clone()
    }

    pub fn created_by_realtime(&self) -> bool {
        self.created_by_realtime
    }

    pub fn runs_on(&self, code: ServiceCode) -> bool {
        self.service_codes.load().contains(code.index())
    }

    /// Extends the service-code set by replacing it with a grown clone.
    /// Readers holding the previous set keep traversing it unharmed.
    pub fn add_service_code(&self, code: ServiceCode) {
        let current = self.service_codes.load_full();
        if current.contains(code.index()) {
            return;
        }
        let mut next = FixedBitSet::clone(&current);
        if next.len() <= code.index() {
            next.grow(code.index() + 1);
        }
        next.insert(code.index());
        self.service_codes.store(Arc::new(next));
    }
}

impl PartialEq for TripPattern {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TripPattern {}
