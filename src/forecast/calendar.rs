//! Business-day arithmetic.
//!
//! Forecast horizons count working days only. The default calendar knows
//! about weekends; organization holiday calendars are an external
//! collaborator plugged in through [`WorkdayCalendar`].

use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Decides whether work happens on a given date.
pub trait WorkdayCalendar: Send + Sync {
    fn is_workday(&self, date: NaiveDate) -> bool;
}

/// Weekdays are workdays; no holidays.
#[derive(Debug, Default, Clone, Copy)]
pub struct Weekdays;

impl WorkdayCalendar for Weekdays {
    fn is_workday(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// Weekday calendar with an explicit holiday set.
#[derive(Debug, Default, Clone)]
pub struct HolidayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        HolidayCalendar {
            holidays: holidays.into_iter().collect(),
        }
    }
}

impl WorkdayCalendar for HolidayCalendar {
    fn is_workday(&self, date: NaiveDate) -> bool {
        Weekdays.is_workday(date) && !self.holidays.contains(&date)
    }
}

/// Number of workdays in `(from, to]`.
///
/// Zero when `to <= from`.
pub fn working_days_between(
    calendar: &dyn WorkdayCalendar,
    from: NaiveDate,
    to: NaiveDate,
) -> u32 {
    let mut count = 0;
    let mut date = from;
    while date < to {
        date = next_day(date);
        if calendar.is_workday(date) {
            count += 1;
        }
    }
    count
}

/// The date `n` workdays after `start` (`n = 0` returns `start`).
pub fn add_working_days(calendar: &dyn WorkdayCalendar, start: NaiveDate, n: u32) -> NaiveDate {
    let mut date = start;
    let mut remaining = n;
    while remaining > 0 {
        date = next_day(date);
        if calendar.is_workday(date) {
            remaining -= 1;
        }
    }
    date
}

fn next_day(date: NaiveDate) -> NaiveDate {
    // NaiveDate::MAX is ~year 262143; adding one day only fails there.
    date.checked_add_days(Days::new(1)).unwrap_or(date)
}
