//! The snapshot source: single writer, many readers.
//!
//! One producer applies update batches under a fair async mutex; planner
//! threads read the last published snapshot through an atomic handoff and
//! never block on the writer. Snapshots are committed at most once per
//! throttle window, because duplicating the overlay index costs more than
//! serving a slightly stale snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::TripPatternCache;
use crate::calendar::parse_service_date;
use crate::classify::{TripUpdateType, classify};
use crate::error::UpdateError;
use crate::gc::PurgePolicy;
use crate::graph::Graph;
use crate::messages::{TripDescriptor, TripUpdate};
use crate::snapshot::TimetableSnapshot;
use crate::updater::TimetableUpdater;

/// Completes partial trip descriptors (typically missing trip ids) before
/// classification. Implementations live outside the engine.
pub trait FuzzyTripMatcher: Send + Sync {
    fn match_trip(&self, feed_id: &str, trip: &TripDescriptor) -> Option<TripDescriptor>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSourceConfig {
    /// Minimum milliseconds between published snapshots.
    pub max_snapshot_frequency_ms: u64,
    /// Emit a progress line every this many applied updates.
    pub log_frequency: u64,
    /// Drop realtime data for long-gone service dates after each batch.
    pub purge_expired_data: bool,
}

impl Default for SnapshotSourceConfig {
    fn default() -> Self {
        Self {
            max_snapshot_frequency_ms: 1000,
            log_frequency: 2000,
            purge_expired_data: true,
        }
    }
}

/// Outcome of one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub applied: usize,
    pub skipped: usize,
}

struct WriterState {
    buffer: TimetableSnapshot,
    cache: TripPatternCache,
    purge: PurgePolicy,
    last_snapshot: Option<Instant>,
    applied_update_count: u64,
}

pub struct TimetableSnapshotSource {
    graph: Arc<Graph>,
    config: SnapshotSourceConfig,
    fuzzy_matcher: Option<Box<dyn FuzzyTripMatcher>>,
    writer: Mutex<WriterState>,
    /// The last committed snapshot. Written under the writer lock, read
    /// freely.
    snapshot: ArcSwap<TimetableSnapshot>,
}

impl TimetableSnapshotSource {
    pub fn new(graph: Arc<Graph>, config: SnapshotSourceConfig) -> Self {
        let cache = TripPatternCache::new(&graph);
        let mut empty = TimetableSnapshot::new();
        let initial = empty.commit();
        Self {
            graph,
            config,
            fuzzy_matcher: None,
            writer: Mutex::new(WriterState {
                buffer: empty,
                cache,
                purge: PurgePolicy::default(),
                last_snapshot: None,
                applied_update_count: 0,
            }),
            snapshot: ArcSwap::from_pointee(initial),
        }
    }

    pub fn with_fuzzy_matcher(mut self, matcher: Box<dyn FuzzyTripMatcher>) -> Self {
        self.fuzzy_matcher = Some(matcher);
        self
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// The current immutable snapshot. Never blocks: when the writer lock is
    /// free a due commit is issued first, under contention the last published
    /// snapshot is returned unchanged.
    pub fn get_timetable_snapshot(&self) -> Arc<TimetableSnapshot> {
        if let Ok(mut writer) = self.writer.try_lock() {
            self.commit_if_due(&mut writer, false);
        }
        self.snapshot.load_full()
    }

    /// Applies a batch of trip updates in arrival order.
    ///
    /// Waits on the writer lock (FIFO fair, so a stream of snapshot readers
    /// cannot starve the producer). A `full_dataset` batch replaces all
    /// realtime state; otherwise updates are incremental. Per-update failures
    /// are logged and skipped without touching the buffer, so the snapshot
    /// published afterwards reflects exactly the successfully applied
    /// updates.
    pub async fn apply_trip_updates(
        &self,
        full_dataset: bool,
        updates: &[TripUpdate],
        feed_id: &str,
    ) -> UpdateSummary {
        let mut writer = self.writer.lock().await;
        let writer = &mut *writer;
        let mut summary = UpdateSummary::default();

        if full_dataset
            && let Err(error) = writer.buffer.clear()
        {
            warn!("could not clear the working buffer: {error}");
        }

        for update in updates {
            let trip = match &self.fuzzy_matcher {
                Some(matcher) => matcher
                    .match_trip(feed_id, &update.trip)
                    .unwrap_or_else(|| update.trip.clone()),
                None => update.trip.clone(),
            };
            match self.apply_one(writer, update, &trip) {
                Ok(()) => {
                    summary.applied += 1;
                    writer.applied_update_count += 1;
                    if writer.applied_update_count % self.config.log_frequency.max(1) == 0 {
                        info!(
                            "applied {} trip updates since startup",
                            writer.applied_update_count
                        );
                    }
                }
                Err(error) => {
                    summary.skipped += 1;
                    warn!(
                        "skipping trip update for trip {}: {error}",
                        trip.trip_id.as_deref().unwrap_or("<unknown>")
                    );
                }
            }
        }

        let mut force = false;
        if self.config.purge_expired_data {
            force = writer.purge.purge(&mut writer.buffer, self.graph.today());
        }
        self.commit_if_due(writer, force);
        summary
    }

    fn apply_one(
        &self,
        writer: &mut WriterState,
        update: &TripUpdate,
        trip: &TripDescriptor,
    ) -> Result<(), UpdateError> {
        let service_date = self.resolve_service_date(trip)?;
        let mut updater =
            TimetableUpdater::new(&self.graph, &mut writer.buffer, &mut writer.cache);
        match classify(update) {
            TripUpdateType::Scheduled => updater.handle_scheduled_trip(update, trip, service_date),
            TripUpdateType::Added => updater.handle_added_trip(update, trip, service_date),
            TripUpdateType::Modified => updater.handle_modified_trip(update, trip, service_date),
            TripUpdateType::Canceled => updater.handle_canceled_trip(trip, service_date),
            TripUpdateType::Unscheduled => Err(UpdateError::UnscheduledNotSupported),
        }
    }

    /// A missing start date falls back to today in the graph's time zone.
    /// Trips crossing midnight (departures past 24:00) can then land on the
    /// wrong service day; known limitation.
    fn resolve_service_date(&self, trip: &TripDescriptor) -> Result<NaiveDate, UpdateError> {
        match &trip.start_date {
            Some(raw) => parse_service_date(raw)
                .ok_or_else(|| UpdateError::InvalidStartDate(raw.as_str().into())),
            None => Ok(self.graph.today()),
        }
    }

    fn commit_if_due(&self, writer: &mut WriterState, force: bool) {
        let window = Duration::from_millis(self.config.max_snapshot_frequency_ms);
        let due = force
            || (writer.buffer.is_dirty()
                && writer.last_snapshot.is_none_or(|at| at.elapsed() > window));
        if !due {
            return;
        }
        let snapshot = writer.buffer.commit();
        writer.last_snapshot = Some(Instant::now());
        self.snapshot.store(Arc::new(snapshot));
    }
}
