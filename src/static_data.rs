//! Building a [`Graph`] from a static GTFS feed.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono_tz::Tz;
use compact_str::CompactString;
use gtfs_structures::Gtfs;
use log::{info, warn};

use crate::calendar::{CalendarDate, CalendarWindow, Service, ServiceException};
use crate::graph::Graph;
use crate::model::{
    FeedScopedId, PickupDropOff, Route, Stop, StopTime, Timepoint, TransitMode, Trip,
};

/// Loads a feed from a local path or URL and builds the base graph.
pub fn load_graph(feed_id: &str, source: &str) -> Result<Graph> {
    let gtfs = Gtfs::new(source).map_err(|error| anyhow!("could not read GTFS feed: {error}"))?;
    build_graph(feed_id, &gtfs)
}

/// Builds the base graph from an already parsed feed.
pub fn build_graph(feed_id: &str, gtfs: &Gtfs) -> Result<Graph> {
    let timezone = agency_timezone(gtfs);
    let mut builder = Graph::builder(feed_id, timezone);

    let mut stops: HashMap<CompactString, Arc<Stop>> = HashMap::new();
    for (id, stop) in &gtfs.stops {
        let entity = Arc::new(Stop {
            id: FeedScopedId::new(feed_id, id.as_str()),
            name: stop.name.clone(),
        });
        stops.insert(id.as_str().into(), entity.clone());
        builder.add_stop(entity);
    }

    let mut routes: HashMap<CompactString, Arc<Route>> = HashMap::new();
    for (id, route) in &gtfs.routes {
        let entity = Arc::new(Route {
            id: FeedScopedId::new(feed_id, id.as_str()),
            mode: transit_mode(route.route_type),
            agency: route.agency_id.as_deref().unwrap_or(feed_id).into(),
            short_name: route.short_name.clone(),
            long_name: route.long_name.clone(),
        });
        routes.insert(id.as_str().into(), entity.clone());
        builder.add_route(entity);
    }

    let mut services: HashMap<CompactString, Service> = HashMap::new();
    for (id, calendar) in &gtfs.calendar {
        services
            .entry(id.as_str().into())
            .or_default()
            .windows
            .push(CalendarWindow {
                monday: calendar.monday,
                tuesday: calendar.tuesday,
                wednesday: calendar.wednesday,
                thursday: calendar.thursday,
                friday: calendar.friday,
                saturday: calendar.saturday,
                sunday: calendar.sunday,
                start_date: calendar.start_date,
                end_date: calendar.end_date,
            });
    }
    for (id, dates) in &gtfs.calendar_dates {
        let service = services.entry(id.as_str().into()).or_default();
        for date in dates {
            service.dates.push(CalendarDate {
                date: date.date,
                exception: match date.exception_type {
                    gtfs_structures::Exception::Added => ServiceException::Added,
                    gtfs_structures::Exception::Deleted => ServiceException::Removed,
                },
            });
        }
    }
    for (id, service) in services {
        builder.add_service(id, service);
    }

    let mut trip_count = 0usize;
    for (id, trip) in &gtfs.trips {
        let Some(route) = routes.get(trip.route_id.as_str()) else {
            warn!("trip {id} references unknown route {}, dropping it", trip.route_id);
            continue;
        };
        let entity = Arc::new(Trip {
            id: FeedScopedId::new(feed_id, id.as_str()),
            route: route.clone(),
            service_id: trip.service_id.as_str().into(),
            headsign: trip.trip_headsign.clone(),
        });

        let mut stop_times = Vec::with_capacity(trip.stop_times.len());
        let mut complete = true;
        for st in &trip.stop_times {
            let Some(stop) = stops.get(st.stop.id.as_str()) else {
                warn!("trip {id} calls at unknown stop {}, dropping it", st.stop.id);
                complete = false;
                break;
            };
            // Interpolation of missing times is out of scope; a one-sided
            // time borrows its counterpart, a timeless call drops the trip.
            let (Some(arrival), Some(departure)) = (
                st.arrival_time.or(st.departure_time),
                st.departure_time.or(st.arrival_time),
            ) else {
                warn!("trip {id} has a stop time without times, dropping it");
                complete = false;
                break;
            };
            stop_times.push(StopTime {
                stop: stop.clone(),
                stop_sequence: st.stop_sequence,
                arrival: arrival as i32,
                departure: departure as i32,
                pickup: pickup_drop_off(st.pickup_type),
                dropoff: pickup_drop_off(st.drop_off_type),
                timepoint: match st.timepoint {
                    gtfs_structures::TimepointType::Approximate => Timepoint::Approximate,
                    _ => Timepoint::Exact,
                },
            });
        }
        if !complete {
            continue;
        }
        builder.add_trip(entity, stop_times);
        trip_count += 1;
    }

    info!(
        "loaded static feed {feed_id}: {} stops, {} routes, {trip_count} trips",
        gtfs.stops.len(),
        gtfs.routes.len(),
    );
    Ok(builder.build())
}

fn agency_timezone(gtfs: &Gtfs) -> Tz {
    let timezone = gtfs
        .agencies
        .first()
        .and_then(|agency| Tz::from_str(&agency.timezone).ok());
    if timezone.is_none() {
        warn!("no parseable agency time zone, falling back to UTC");
    }
    timezone.unwrap_or(chrono_tz::UTC)
}

fn transit_mode(route_type: gtfs_structures::RouteType) -> TransitMode {
    use gtfs_structures::RouteType;
    match route_type {
        RouteType::Tramway => TransitMode::Tram,
        RouteType::Subway => TransitMode::Subway,
        RouteType::Rail => TransitMode::Rail,
        RouteType::Bus => TransitMode::Bus,
        RouteType::Ferry => TransitMode::Ferry,
        RouteType::CableCar => TransitMode::CableCar,
        RouteType::Gondola => TransitMode::Gondola,
        RouteType::Funicular => TransitMode::Funicular,
        _ => TransitMode::Other,
    }
}

fn pickup_drop_off(value: gtfs_structures::PickupDropOffType) -> PickupDropOff {
    use gtfs_structures::PickupDropOffType;
    match value {
        PickupDropOffType::Regular => PickupDropOff::Regular,
        PickupDropOffType::NotAvailable => PickupDropOff::NotAvailable,
        PickupDropOffType::ArrangeByPhone => PickupDropOff::ArrangeByPhone,
        PickupDropOffType::CoordinateWithDriver => PickupDropOff::CoordinateWithDriver,
        _ => PickupDropOff::Regular,
    }
}
