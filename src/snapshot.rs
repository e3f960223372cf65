//! The timetable snapshot: both the single working buffer and every
//! published snapshot share this shape.
//!
//! The buffer is mutated only under the writer lock. `commit` produces a
//! committed copy whose maps share the unchanged `Timetable`s (every
//! mutation replaces whole `Arc`ed timetables, so sharing is safe), and a
//! committed snapshot rejects all further mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use compact_str::CompactString;

use crate::error::UpdateError;
use crate::model::Route;
use crate::pattern::{PatternId, TripPattern};
use crate::timetable::{Timetable, TripTimes};

#[derive(Debug, Default)]
pub struct TimetableSnapshot {
    /// Realtime overlays by pattern and service date.
    timetables: HashMap<(PatternId, NaiveDate), Arc<Timetable>>,
    /// Pattern of the most recent added/modified trip per id and date.
    last_added_trip_pattern: HashMap<(CompactString, NaiveDate), Arc<TripPattern>>,
    /// Owning route of every realtime-created pattern, kept for purging.
    realtime_routes: HashMap<PatternId, Arc<Route>>,
    dirty: bool,
    committed: bool,
}

impl TimetableSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn overlay_count(&self) -> usize {
        self.timetables.len()
    }

    pub fn has_overlay(&self, pattern: &TripPattern, date: NaiveDate) -> bool {
        self.timetables.contains_key(&(pattern.id(), date))
    }

    /// The timetable in force for a pattern on a date: the realtime overlay
    /// when one exists, the scheduled timetable otherwise.
    pub fn resolve(&self, pattern: &TripPattern, date: NaiveDate) -> Arc<Timetable> {
        self.timetables
            .get(&(pattern.id(), date))
            .cloned()
            .unwrap_or_else(|| pattern.scheduled_timetable())
    }

    pub fn last_added_trip_pattern(
        &self,
        trip_id: &str,
        date: NaiveDate,
    ) -> Option<&Arc<TripPattern>> {
        self.last_added_trip_pattern
            .get(&(CompactString::from(trip_id), date))
    }

    pub fn route_for_realtime_pattern(&self, pattern: &TripPattern) -> Option<&Arc<Route>> {
        self.realtime_routes.get(&pattern.id())
    }

    /// Lays `updated` over the pattern's timetable for the date, creating the
    /// overlay from the scheduled timetable on first touch.
    pub fn update(
        &mut self,
        pattern: &Arc<TripPattern>,
        updated: TripTimes,
        date: NaiveDate,
    ) -> Result<(), UpdateError> {
        if self.committed {
            return Err(UpdateError::ReadOnlySnapshot);
        }
        let trip_id = updated.trip().id.id.clone();
        let key = (pattern.id(), date);
        let updated_timetable = match self.timetables.get(&key) {
            Some(existing) => existing.with_updated_trip_times(Arc::new(updated)),
            None => pattern
                .scheduled_timetable()
                .for_service_date(date)
                .with_updated_trip_times(Arc::new(updated)),
        };
        self.timetables.insert(key, Arc::new(updated_timetable));

        if pattern.created_by_realtime() {
            self.last_added_trip_pattern
                .insert((trip_id, date), pattern.clone());
            self.realtime_routes
                .insert(pattern.id(), pattern.route().clone());
        }
        self.dirty = true;
        Ok(())
    }

    /// Empties the buffer ahead of a full-dataset batch. A fresh buffer stays
    /// clean.
    pub fn clear(&mut self) -> Result<(), UpdateError> {
        if self.committed {
            return Err(UpdateError::ReadOnlySnapshot);
        }
        if self.timetables.is_empty()
            && self.last_added_trip_pattern.is_empty()
            && self.realtime_routes.is_empty()
        {
            return Ok(());
        }
        self.timetables.clear();
        self.last_added_trip_pattern.clear();
        self.realtime_routes.clear();
        self.dirty = true;
        Ok(())
    }

    /// Freezes the current state into a committed snapshot and marks the
    /// buffer clean. The copy shares the unchanged timetables.
    pub fn commit(&mut self) -> TimetableSnapshot {
        self.dirty = false;
        TimetableSnapshot {
            timetables: self.timetables.clone(),
            last_added_trip_pattern: self.last_added_trip_pattern.clone(),
            realtime_routes: self.realtime_routes.clone(),
            dirty: false,
            committed: true,
        }
    }

    /// Drops overlays whose service date lies strictly before `cutoff`, and
    /// realtime-created patterns left without any overlay. Returns whether
    /// anything was removed.
    pub fn purge_expired_data(&mut self, cutoff: NaiveDate) -> bool {
        if self.committed {
            return false;
        }
        let before = self.timetables.len() + self.last_added_trip_pattern.len();
        self.timetables.retain(|(_, date), _| *date >= cutoff);
        self.last_added_trip_pattern
            .retain(|(_, date), _| *date >= cutoff);

        let live: HashSet<PatternId> = self.timetables.keys().map(|(pattern, _)| *pattern).collect();
        self.realtime_routes
            .retain(|pattern, _| live.contains(pattern));

        let removed = self.timetables.len() + self.last_added_trip_pattern.len() < before;
        if removed {
            self.dirty = true;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::ServiceCode;
    use crate::graph::Deduplicator;
    use crate::model::FeedScopedId;
    use crate::pattern::StopPattern;
    use crate::testutil;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn base_pattern() -> (Arc<TripPattern>, TripTimes) {
        let graph = testutil::graph();
        let pattern = graph
            .pattern_for_trip(&FeedScopedId::new("F", "T1"))
            .unwrap()
            .clone();
        let times = (**pattern
            .scheduled_timetable()
            .trip_times_for_trip("T1")
            .unwrap())
        .clone();
        (pattern, times)
    }

    fn realtime_pattern() -> (Arc<TripPattern>, TripTimes) {
        let route = testutil::route("NEW");
        let trip = testutil::trip("NEW", &route, "WK");
        let stop_times = testutil::t1_stop_times();
        let deduplicator = Deduplicator::default();
        let times =
            TripTimes::from_stop_times(trip, &stop_times, ServiceCode(0), &deduplicator);
        let pattern = Arc::new(TripPattern::new(
            PatternId(500),
            route,
            StopPattern::from_stop_times(&stop_times),
            Arc::new(Timetable::empty()),
            Default::default(),
            true,
        ));
        (pattern, times)
    }

    #[test]
    fn update_creates_overlay_and_resolve_prefers_it() {
        let (pattern, mut times) = base_pattern();
        times.cancel();

        let mut buffer = TimetableSnapshot::new();
        assert!(!buffer.has_overlay(&pattern, date()));
        let scheduled = buffer.resolve(&pattern, date());
        assert!(!scheduled.trip_times_for_trip("T1").unwrap().is_canceled());

        buffer.update(&pattern, times, date()).unwrap();
        assert!(buffer.is_dirty());
        assert!(buffer.has_overlay(&pattern, date()));
        let overlay = buffer.resolve(&pattern, date());
        assert!(overlay.trip_times_for_trip("T1").unwrap().is_canceled());
        // Other trips on the pattern came along from the scheduled timetable.
        assert!(overlay.trip_times_for_trip("T2").is_some());
        // Another date still resolves to the schedule.
        let other_date = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        assert!(!buffer.has_overlay(&pattern, other_date));
    }

    #[test]
    fn realtime_patterns_record_bookkeeping() {
        let (pattern, times) = realtime_pattern();
        let mut buffer = TimetableSnapshot::new();
        buffer.update(&pattern, times, date()).unwrap();

        let last = buffer.last_added_trip_pattern("NEW", date()).unwrap();
        assert!(Arc::ptr_eq(last, &pattern));
        assert!(buffer.route_for_realtime_pattern(&pattern).is_some());
        // The overlay names a trip with the recorded id.
        let overlay = buffer.resolve(&pattern, date());
        assert!(overlay.trip_times_for_trip("NEW").is_some());
    }

    #[test]
    fn committed_snapshot_rejects_mutation() {
        let (pattern, times) = base_pattern();
        let mut buffer = TimetableSnapshot::new();
        buffer.update(&pattern, times.clone(), date()).unwrap();

        let mut snapshot = buffer.commit();
        assert!(snapshot.is_committed());
        assert!(!buffer.is_dirty());
        assert_eq!(
            snapshot.update(&pattern, times.clone(), date()),
            Err(UpdateError::ReadOnlySnapshot)
        );
        assert_eq!(snapshot.clear(), Err(UpdateError::ReadOnlySnapshot));
        assert!(!snapshot.purge_expired_data(date()));
    }

    #[test]
    fn committed_snapshot_is_isolated_from_later_buffer_writes() {
        let (pattern, times) = base_pattern();
        let mut buffer = TimetableSnapshot::new();
        buffer.update(&pattern, times.clone(), date()).unwrap();

        let snapshot = buffer.commit();
        let seen_before = snapshot.resolve(&pattern, date());

        let mut canceled = times;
        canceled.cancel();
        buffer.update(&pattern, canceled, date()).unwrap();

        let seen_after = snapshot.resolve(&pattern, date());
        assert!(Arc::ptr_eq(&seen_before, &seen_after));
        assert!(!seen_after.trip_times_for_trip("T1").unwrap().is_canceled());
    }

    #[test]
    fn clear_on_empty_buffer_is_a_noop() {
        let mut buffer = TimetableSnapshot::new();
        buffer.clear().unwrap();
        assert!(!buffer.is_dirty());

        let (pattern, times) = base_pattern();
        buffer.update(&pattern, times, date()).unwrap();
        buffer.commit();
        buffer.clear().unwrap();
        assert!(buffer.is_dirty());
        assert_eq!(buffer.overlay_count(), 0);
    }

    #[test]
    fn purge_drops_old_dates_and_orphaned_patterns() {
        let (base, base_times) = base_pattern();
        let (added, added_times) = realtime_pattern();
        let old_date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();

        let mut buffer = TimetableSnapshot::new();
        buffer.update(&added, added_times, old_date).unwrap();
        buffer.update(&base, base_times, date()).unwrap();
        buffer.commit();

        assert!(buffer.purge_expired_data(date()));
        assert!(buffer.is_dirty());
        assert_eq!(buffer.overlay_count(), 1);
        assert!(buffer.has_overlay(&base, date()));
        assert!(buffer.last_added_trip_pattern("NEW", old_date).is_none());
        assert!(buffer.route_for_realtime_pattern(&added).is_none());

        // Nothing old remains, so a second purge removes nothing.
        assert!(!buffer.purge_expired_data(date()));
    }
}
