use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use super::ConfigError;

/// Acquisition window. The start is always inclusive; whether the end date is
/// included is stated explicitly instead of relying on a backend convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
    end_inclusive: bool,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, end_inclusive: bool) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::DateOrder);
        }
        if start == end && !end_inclusive {
            return Err(ConfigError::EmptyDateWindow);
        }

        Ok(Self {
            start,
            end,
            end_inclusive,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn end_inclusive(&self) -> bool {
        self.end_inclusive
    }

    /// First instant that is no longer inside the window.
    pub fn exclusive_end(&self) -> NaiveDate {
        if self.end_inclusive {
            self.end + Duration::days(1)
        } else {
            self.end
        }
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        let day = time.date_naive();
        day >= self.start && day < self.exclusive_end()
    }
}

/// Calendar-month filter, inclusive on both ends. Ranges that wrap across the
/// year boundary (e.g. November to February) are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    start: u32,
    end: u32,
}

impl MonthRange {
    pub fn new(start: u32, end: u32) -> Result<Self, ConfigError> {
        for month in [start, end] {
            if !(1..=12).contains(&month) {
                return Err(ConfigError::MonthOutOfRange(month));
            }
        }
        if start > end {
            return Err(ConfigError::MonthRangeWrap { start, end });
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        (self.start..=self.end).contains(&time.month())
    }
}
