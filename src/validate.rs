//! Structural validation of added and replacement trips.

use std::sync::Arc;

use crate::error::UpdateError;
use crate::index::IdIndex;
use crate::messages::StopTimeUpdate;
use crate::model::Stop;

/// Checks the stop time updates of a trip that defines a fresh stop pattern
/// and resolves their stops, leaving a `None` hole wherever a stop is
/// skipped.
///
/// Rejects updates with fewer than two stops, unresolvable non-skipped
/// stops, out-of-order stop sequences, and times that run backwards (one
/// cursor shared by arrival and departure readings). Arrival times may be
/// absent only on a leading run of stops, departure times only on a trailing
/// run, so the realized trip still spans a checkable interval.
pub fn check_new_stop_time_updates(
    updates: &[StopTimeUpdate],
    index: &IdIndex,
) -> Result<Vec<Option<Arc<Stop>>>, UpdateError> {
    if updates.len() < 2 {
        return Err(UpdateError::TooFewStops);
    }

    let mut stops = Vec::with_capacity(updates.len());
    for stu in updates {
        if stu.is_skipped() {
            stops.push(None);
            continue;
        }
        let Some(stop_id) = &stu.stop_id else {
            return Err(UpdateError::MissingStopId);
        };
        match index.stop(stop_id) {
            Some(stop) => stops.push(Some(stop.clone())),
            None => return Err(UpdateError::StopNotFound(stop_id.as_str().into())),
        }
    }

    let mut last_sequence: Option<u32> = None;
    for stu in updates {
        if let Some(sequence) = stu.stop_sequence {
            if last_sequence.is_some_and(|last| sequence < last) {
                return Err(UpdateError::DecreasingStopSequence);
            }
            last_sequence = Some(sequence);
        }
    }

    let mut time_cursor: Option<i64> = None;
    for stu in updates {
        for time in [stu.arrival_time(), stu.departure_time()].into_iter().flatten() {
            if time_cursor.is_some_and(|last| time < last) {
                return Err(UpdateError::DecreasingTimes);
            }
            time_cursor = Some(time);
        }
    }

    let mut seen_arrival = false;
    for stu in updates.iter().filter(|stu| !stu.is_skipped()) {
        if stu.arrival_time().is_some() {
            seen_arrival = true;
        } else if seen_arrival {
            return Err(UpdateError::MissingTime);
        }
    }

    let mut seen_departure = false;
    for stu in updates.iter().rev().filter(|stu| !stu.is_skipped()) {
        if stu.departure_time().is_some() {
            seen_departure = true;
        } else if seen_departure {
            return Err(UpdateError::MissingTime);
        }
    }

    Ok(stops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{StopScheduleRelationship, StopTimeEvent};
    use crate::testutil;

    fn stu(stop_id: &str, arrival: Option<i64>, departure: Option<i64>) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_id: Some(stop_id.to_owned()),
            arrival: arrival.map(|time| StopTimeEvent {
                time: Some(time),
                ..StopTimeEvent::default()
            }),
            departure: departure.map(|time| StopTimeEvent {
                time: Some(time),
                ..StopTimeEvent::default()
            }),
            ..StopTimeUpdate::default()
        }
    }

    fn skipped() -> StopTimeUpdate {
        StopTimeUpdate {
            schedule_relationship: Some(StopScheduleRelationship::Skipped),
            ..StopTimeUpdate::default()
        }
    }

    #[test]
    fn resolves_stops_in_order() {
        let graph = testutil::graph();
        let stops = check_new_stop_time_updates(
            &[
                stu("A", None, Some(100)),
                stu("B", Some(200), Some(210)),
                stu("C", Some(300), None),
            ],
            graph.index(),
        )
        .unwrap();
        assert_eq!(stops.len(), 3);
        assert_eq!(stops[1].as_ref().unwrap().id.id, "B");
    }

    #[test]
    fn skipped_stops_become_holes() {
        let graph = testutil::graph();
        let stops = check_new_stop_time_updates(
            &[stu("A", None, Some(100)), skipped(), stu("C", Some(300), None)],
            graph.index(),
        )
        .unwrap();
        assert!(stops[0].is_some());
        assert!(stops[1].is_none());
        assert!(stops[2].is_some());
    }

    #[test]
    fn rejects_missing_and_unknown_stops() {
        let graph = testutil::graph();
        let mut nameless = stu("A", None, Some(100));
        nameless.stop_id = None;
        assert_eq!(
            check_new_stop_time_updates(
                &[nameless, stu("B", Some(200), None)],
                graph.index()
            ),
            Err(UpdateError::MissingStopId)
        );
        assert_eq!(
            check_new_stop_time_updates(
                &[stu("A", None, Some(100)), stu("Z9", Some(200), None)],
                graph.index()
            ),
            Err(UpdateError::StopNotFound("Z9".into()))
        );
    }

    #[test]
    fn rejects_too_few_stops() {
        let graph = testutil::graph();
        assert_eq!(
            check_new_stop_time_updates(&[stu("A", None, Some(100))], graph.index()),
            Err(UpdateError::TooFewStops)
        );
    }

    #[test]
    fn rejects_decreasing_sequences() {
        let graph = testutil::graph();
        let mut first = stu("A", None, Some(100));
        first.stop_sequence = Some(5);
        let mut second = stu("B", Some(200), None);
        second.stop_sequence = Some(4);
        assert_eq!(
            check_new_stop_time_updates(&[first, second], graph.index()),
            Err(UpdateError::DecreasingStopSequence)
        );
    }

    #[test]
    fn time_cursor_is_shared_between_arrivals_and_departures() {
        let graph = testutil::graph();
        // Departure of the first stop later than arrival at the second.
        assert_eq!(
            check_new_stop_time_updates(
                &[stu("A", None, Some(250)), stu("B", Some(200), None)],
                graph.index()
            ),
            Err(UpdateError::DecreasingTimes)
        );
        // Arrival after departure within one stop.
        assert_eq!(
            check_new_stop_time_updates(
                &[stu("A", None, Some(100)), stu("B", Some(300), Some(200))],
                graph.index()
            ),
            Err(UpdateError::DecreasingTimes)
        );
    }

    #[test]
    fn arrival_gaps_allowed_only_as_a_prefix() {
        let graph = testutil::graph();
        // Missing arrival after one was present.
        assert_eq!(
            check_new_stop_time_updates(
                &[
                    stu("A", Some(100), Some(110)),
                    stu("B", None, Some(200)),
                    stu("C", Some(300), None),
                ],
                graph.index()
            ),
            Err(UpdateError::MissingTime)
        );
    }

    #[test]
    fn departure_gaps_allowed_only_as_a_suffix() {
        let graph = testutil::graph();
        assert_eq!(
            check_new_stop_time_updates(
                &[
                    stu("A", None, Some(100)),
                    stu("B", Some(200), None),
                    stu("C", Some(300), Some(310)),
                ],
                graph.index()
            ),
            Err(UpdateError::MissingTime)
        );
        // The same shape with the gap at the end is fine.
        assert!(
            check_new_stop_time_updates(
                &[
                    stu("A", None, Some(100)),
                    stu("B", Some(200), Some(210)),
                    stu("C", Some(300), None),
                ],
                graph.index()
            )
            .is_ok()
        );
    }
}
