//! Base transit entities.
//!
//! Stops, routes and trips from the static feed are loaded once and shared
//! immutably. Routes and trips synthesized for realtime-added service are
//! fresh entities owned by the working buffer.

use std::fmt;
use std::sync::Arc;

use compact_str::CompactString;

/// Entity identifier scoped to the feed it came from.
///
/// Lookups currently use the bare local id only (single static feed); the
/// feed id is carried so a feed-qualified index can replace the bare one
/// without touching entity types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FeedScopedId {
    pub feed_id: CompactString,
    pub id: CompactString,
}

impl FeedScopedId {
    pub fn new(feed_id: impl Into<CompactString>, id: impl Into<CompactString>) -> Self {
        Self {
            feed_id: feed_id.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for FeedScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.feed_id, self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stop {
    pub id: FeedScopedId,
    pub name: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitMode {
    Tram,
    Subway,
    Rail,
    #[default]
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub id: FeedScopedId,
    pub mode: TransitMode,
    pub agency: CompactString,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trip {
    pub id: FeedScopedId,
    pub route: Arc<Route>,
    pub service_id: CompactString,
    pub headsign: Option<String>,
}

/// Boarding / alighting policy at one pattern stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PickupDropOff {
    #[default]
    Regular,
    NotAvailable,
    ArrangeByPhone,
    CoordinateWithDriver,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Timepoint {
    #[default]
    Exact,
    Approximate,
}

/// One scheduled call of a trip at a stop. Times are seconds from service
/// date midnight and may exceed 24h for trips running past midnight.
#[derive(Clone, Debug)]
pub struct StopTime {
    pub stop: Arc<Stop>,
    pub stop_sequence: u32,
    pub arrival: i32,
    pub departure: i32,
    pub pickup: PickupDropOff,
    pub dropoff: PickupDropOff,
    pub timepoint: Timepoint,
}
