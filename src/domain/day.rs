//! Calendar-day windows. Days are UTC; a window is half-open
//! `[00:00, next day 00:00)`.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

pub fn next_day(date: NaiveDate) -> NaiveDate {
    date + Duration::days(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate) -> Self {
        Self::between(date, date)
    }

    /// Covers every day from `first` through `last`, both inclusive.
    pub fn between(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: start_of_day(first),
            end: start_of_day(next_day(last)),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Inclusive sequence of dates, oldest first.
pub fn days_inclusive(first: NaiveDate, last: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    first
        .iter_days()
        .take_while(move |date| *date <= last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_window_is_half_open() {
        let window = DayWindow::for_date(date("2024-03-10"));

        assert!(window.contains(start_of_day(date("2024-03-10"))));
        assert!(window.contains(start_of_day(date("2024-03-11")) - Duration::nanoseconds(1)));
        assert!(!window.contains(start_of_day(date("2024-03-11"))));
        assert!(!window.contains(start_of_day(date("2024-03-10")) - Duration::nanoseconds(1)));
    }

    #[test]
    fn test_between_spans_both_ends() {
        let window = DayWindow::between(date("2024-02-28"), date("2024-03-01"));
        assert_eq!(window.start, start_of_day(date("2024-02-28")));
        assert_eq!(window.end, start_of_day(date("2024-03-02")));
    }

    #[test]
    fn test_days_inclusive_crosses_leap_day() {
        let days: Vec<_> = days_inclusive(date("2024-02-28"), date("2024-03-01")).collect();
        assert_eq!(days, vec![date("2024-02-28"), date("2024-02-29"), date("2024-03-01")]);
    }

    #[test]
    fn test_days_inclusive_empty_when_reversed() {
        assert_eq!(days_inclusive(date("2024-03-02"), date("2024-03-01")).count(), 0);
    }
}
