//! Closing periods
//!
//! A closing period is an inclusive range of calendar dates. The closing job
//! walks it one day at a time, so the main operation here is day iteration.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },
}

/// An inclusive range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingPeriod {
    /// First day of the period (inclusive)
    start: NaiveDate,
    /// Last day of the period (inclusive)
    end: NaiveDate,
}

impl ClosingPeriod {
    /// Creates a new period
    ///
    /// # Errors
    ///
    /// Returns `TemporalError::InvalidPeriod` if `start` is after `end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Creates a single-day period
    pub fn single_day(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Returns true if the date falls within the period
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days in the period, both ends included
    pub fn day_count(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Iterates every calendar day of the period in ascending order
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_dates_are_inclusive() {
        let period = ClosingPeriod::new(date(2024, 1, 1), date(2024, 1, 3)).unwrap();
        let dates: Vec<_> = period.dates().collect();
        assert_eq!(dates, vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)]);
        assert_eq!(period.day_count(), 3);
    }

    #[test]
    fn test_leap_year_february() {
        let period = ClosingPeriod::new(date(2024, 2, 1), date(2024, 2, 29)).unwrap();
        assert_eq!(period.dates().count(), 29);
    }

    #[test]
    fn test_reversed_period_is_rejected() {
        let result = ClosingPeriod::new(date(2024, 2, 1), date(2024, 1, 31));
        assert!(matches!(result, Err(TemporalError::InvalidPeriod { .. })));
    }
}
