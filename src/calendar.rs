//! Service calendars: on which dates a service id runs.

use chrono::{Datelike, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;

/// Dense index of a service id, used in per-pattern service bitsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceCode(pub(crate) u32);

impl ServiceCode {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceException {
    Added,
    Removed,
}

#[derive(Clone, Debug)]
pub struct CalendarDate {
    pub date: NaiveDate,
    pub exception: ServiceException,
}

/// Weekly repeating availability between two dates, as in calendar.txt.
#[derive(Clone, Debug)]
pub struct CalendarWindow {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CalendarWindow {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        if date < self.start_date || date > self.end_date {
            return false;
        }
        match date.weekday() {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

/// One service id's calendar: weekly windows plus date exceptions.
#[derive(Clone, Debug, Default)]
pub struct Service {
    pub windows: Vec<CalendarWindow>,
    pub dates: Vec<CalendarDate>,
}

impl Service {
    /// Date exceptions win over the weekly windows.
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        for exception in &self.dates {
            if exception.date == date {
                return exception.exception == ServiceException::Added;
            }
        }
        self.windows.iter().any(|window| window.runs_on(date))
    }
}

/// Parses a `YYYYMMDD` service date as used in trip descriptors.
pub fn parse_service_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

/// Epoch seconds at which the service date's clock starts.
///
/// GTFS measures stop times from "noon minus twelve hours", which keeps the
/// anchor stable across daylight-saving transitions. On transition days this
/// differs from local midnight by the shifted hour, matching the static feed.
pub fn service_date_start_seconds(tz: Tz, date: NaiveDate) -> Option<i64> {
    let noon = date.and_time(NaiveTime::from_hms_opt(12, 0, 0)?);
    let zoned = tz.from_local_datetime(&noon).earliest()?;
    Some(zoned.timestamp() - 12 * 3600)
}
