//! Bucket key calculation for time-bucketed summaries

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// ISO week identifier; the year is the ISO year, not the calendar year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    pub iso_year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            iso_year: iso.year(),
            week: iso.week(),
        }
    }

    /// Monday of this week
    pub fn monday(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.iso_year, self.week, Weekday::Mon)
    }

    /// The week immediately before this one
    pub fn previous(&self) -> Option<Self> {
        self.monday().map(|monday| Self::of(monday - Duration::days(7)))
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Weekly: YYYY-Www (ISO week)
        write!(f, "{}-W{:02}", self.iso_year, self.week)
    }
}

/// Calendar month identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Monthly: YYYY-MM
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_key() {
        assert_eq!(WeekKey::of(date(2026, 1, 5)).to_string(), "2026-W02");
        assert_eq!(WeekKey::of(date(2026, 1, 11)), WeekKey::of(date(2026, 1, 5)));
    }

    #[test]
    fn test_week_key_year_boundary() {
        // 2024-12-30 is Monday of ISO week 1 of 2025
        assert_eq!(WeekKey::of(date(2024, 12, 30)).to_string(), "2025-W01");
        // 2027-01-01 is a Friday in ISO week 53 of 2026
        assert_eq!(WeekKey::of(date(2027, 1, 1)).to_string(), "2026-W53");
    }

    #[test]
    fn test_previous_week() {
        let first = WeekKey::of(date(2025, 1, 1));
        assert_eq!(first.previous().unwrap().to_string(), "2024-W52");
        let w10 = WeekKey { iso_year: 2026, week: 10 };
        assert_eq!(w10.previous().unwrap(), WeekKey { iso_year: 2026, week: 9 });
    }

    #[test]
    fn test_month_key() {
        assert_eq!(MonthKey::of(date(2026, 3, 15)).to_string(), "2026-03");
    }
}
