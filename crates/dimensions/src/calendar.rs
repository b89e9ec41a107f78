//! Calendar rows for dim_date
//!
//! Pure and deterministic: the same year range always yields the same rows.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use whsync_config::{MAX_CALENDAR_YEAR, MIN_CALENDAR_YEAR};
use whsync_schema::{DateDimRow, date_key};

use crate::error::{DimensionError, Result};

/// Default first month of the fiscal year
pub const DEFAULT_FISCAL_START_MONTH: u32 = 10;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// ISO-8601 week of `date` as `(week-owning year, week number)`
///
/// The date is moved to the Thursday of its Monday-based week; that Thursday's
/// year owns the week and its day-of-year fixes the number.
pub fn iso_week(date: NaiveDate) -> (i32, u32) {
    let weekday = date.weekday().number_from_monday();
    let thursday = if weekday <= 4 {
        date.checked_add_days(Days::new(u64::from(4 - weekday)))
    } else {
        date.checked_sub_days(Days::new(u64::from(weekday - 4)))
    }
    .unwrap_or(date);

    (thursday.year(), thursday.ordinal0() / 7 + 1)
}

/// Fiscal-year rules and day-row derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    fiscal_start_month: u32,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            fiscal_start_month: DEFAULT_FISCAL_START_MONTH,
        }
    }
}

impl Calendar {
    pub fn new(fiscal_start_month: u32) -> Result<Self> {
        if !(1..=12).contains(&fiscal_start_month) {
            return Err(DimensionError::InvalidFiscalMonth(fiscal_start_month));
        }
        Ok(Self { fiscal_start_month })
    }

    pub fn fiscal_start_month(&self) -> u32 {
        self.fiscal_start_month
    }

    /// Fiscal year of `date`; months from the start month on belong to next year's FY
    pub fn fiscal_year(&self, date: NaiveDate) -> i32 {
        if self.fiscal_start_month > 1 && date.month() >= self.fiscal_start_month {
            date.year() + 1
        } else {
            date.year()
        }
    }

    /// Fiscal quarter of `date`; the start month opens FQ1
    pub fn fiscal_quarter(&self, date: NaiveDate) -> u32 {
        (date.month() + 12 - self.fiscal_start_month) % 12 / 3 + 1
    }

    /// Derive the dim_date row for one day
    pub fn day(&self, date: NaiveDate) -> DateDimRow {
        let (iso_year, week) = iso_week(date);
        let weekday = date.weekday();

        DateDimRow {
            date_key: date_key(date),
            full_date: date,
            year: date.year() as u16,
            quarter: (date.month0() / 3 + 1) as u8,
            month: date.month() as u8,
            month_name: MONTH_NAMES[date.month0() as usize].to_string(),
            week_of_year: week as u8,
            iso_year: iso_year as u16,
            day_of_month: date.day() as u8,
            day_of_week: weekday.number_from_monday() as u8,
            day_name: day_name(weekday).to_string(),
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
            is_holiday: false,
            fiscal_year: self.fiscal_year(date) as u16,
            fiscal_quarter: self.fiscal_quarter(date) as u8,
        }
    }

    /// One row per day from January 1 of `start_year` through December 31 of `end_year`
    pub fn days(&self, start_year: i32, end_year: i32) -> Result<Vec<DateDimRow>> {
        let (first, last) = year_bounds(start_year, end_year)?;
        Ok(first
            .iter_days()
            .take_while(|date| *date <= last)
            .map(|date| self.day(date))
            .collect())
    }
}

/// Check a year range and return its first and last day
pub fn year_bounds(start_year: i32, end_year: i32) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = |reason: String| DimensionError::InvalidYearRange {
        start: start_year,
        end: end_year,
        reason,
    };

    if start_year > end_year {
        return Err(invalid("start year is after end year".to_string()));
    }
    let supported = MIN_CALENDAR_YEAR..=MAX_CALENDAR_YEAR;
    if !supported.contains(&start_year) || !supported.contains(&end_year) {
        return Err(invalid(format!(
            "years must be within {}..={}",
            MIN_CALENDAR_YEAR, MAX_CALENDAR_YEAR
        )));
    }

    let first = NaiveDate::from_ymd_opt(start_year, 1, 1);
    let last = NaiveDate::from_ymd_opt(end_year, 12, 31);
    match (first, last) {
        (Some(first), Some(last)) => Ok((first, last)),
        _ => Err(invalid("year out of calendar range".to_string())),
    }
}

fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
#[path = "calendar_test.rs"]
mod calendar_test;
