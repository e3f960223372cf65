//! Shared fixtures for the unit tests.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::calendar::{CalendarWindow, Service};
use crate::graph::Graph;
use crate::model::{
    FeedScopedId, PickupDropOff, Route, Stop, StopTime, Timepoint, TransitMode, Trip,
};

pub fn stop(id: &str) -> Arc<Stop> {
    Arc::new(Stop {
        id: FeedScopedId::new("F", id),
        name: Some(id.to_owned()),
    })
}

pub fn route(id: &str) -> Arc<Route> {
    Arc::new(Route {
        id: FeedScopedId::new("F", id),
        mode: TransitMode::Bus,
        agency: "metro".into(),
        short_name: Some(id.to_owned()),
        long_name: None,
    })
}

pub fn trip(id: &str, route: &Arc<Route>, service_id: &str) -> Arc<Trip> {
    Arc::new(Trip {
        id: FeedScopedId::new("F", id),
        route: route.clone(),
        service_id: service_id.into(),
        headsign: None,
    })
}

pub fn stop_time(stop: &Arc<Stop>, sequence: u32, arrival: i32, departure: i32) -> StopTime {
    StopTime {
        stop: stop.clone(),
        stop_sequence: sequence,
        arrival,
        departure,
        pickup: PickupDropOff::Regular,
        dropoff: PickupDropOff::Regular,
        timepoint: Timepoint::Exact,
    }
}

/// Stop times of the fixture trip T1: A at 08:00, B at 08:10/08:11, C at
/// 08:20.
pub fn t1_stop_times() -> Vec<StopTime> {
    vec![
        stop_time(&stop("A"), 1, 8 * 3600, 8 * 3600),
        stop_time(&stop("B"), 2, 8 * 3600 + 10 * 60, 8 * 3600 + 11 * 60),
        stop_time(&stop("C"), 3, 8 * 3600 + 20 * 60, 8 * 3600 + 20 * 60),
    ]
}

fn every_day_of_2024() -> Service {
    Service {
        windows: vec![CalendarWindow {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: true,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }],
        dates: vec![],
    }
}

/// A small feed on a UTC clock: stops A through D, route R1, service WK
/// running every day of 2024, and trips T1/T2 both over `[A, B, C]` (T2 an
/// hour later).
pub fn graph() -> Arc<Graph> {
    let mut builder = Graph::builder("F", chrono_tz::UTC);
    for id in ["A", "B", "C", "D"] {
        builder.add_stop(stop(id));
    }
    let r1 = route("R1");
    builder.add_route(r1.clone());
    builder.add_service("WK", every_day_of_2024());
    builder.add_trip(trip("T1", &r1, "WK"), t1_stop_times());
    builder.add_trip(
        trip("T2", &r1, "WK"),
        vec![
            stop_time(&stop("A"), 1, 9 * 3600, 9 * 3600),
            stop_time(&stop("B"), 2, 9 * 3600 + 10 * 60, 9 * 3600 + 11 * 60),
            stop_time(&stop("C"), 3, 9 * 3600 + 20 * 60, 9 * 3600 + 20 * 60),
        ],
    );
    Arc::new(builder.build())
}
