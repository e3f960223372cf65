//! Purging of expired realtime data.

use chrono::{Days, NaiveDate};
use log::{debug, info};

use crate::snapshot::TimetableSnapshot;

/// Drops realtime rows whose service date fell behind a sliding threshold.
///
/// The cutoff trails today by two days, a cushion against time-zone skew
/// around midnight. Runs at the end of an update batch, at most once per
/// cutoff date.
#[derive(Debug, Default)]
pub(crate) struct PurgePolicy {
    last_purge_cutoff: Option<NaiveDate>,
}

impl PurgePolicy {
    /// Returns whether anything was dropped, in which case the caller must
    /// commit immediately.
    pub fn purge(&mut self, buffer: &mut TimetableSnapshot, today: NaiveDate) -> bool {
        let Some(cutoff) = today.checked_sub_days(Days::new(2)) else {
            return false;
        };
        if self.last_purge_cutoff.is_some_and(|last| last >= cutoff) {
            return false;
        }
        self.last_purge_cutoff = Some(cutoff);
        debug!("purging realtime data older than {cutoff}");
        let removed = buffer.purge_expired_data(cutoff);
        if removed {
            info!("purged expired realtime data older than {cutoff}");
        }
        removed
    }
}
