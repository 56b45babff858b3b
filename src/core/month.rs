//! Billing month helpers.
//!
//! Every date stored on readings, rates and bills is the first day of its month.

use crate::errors::{Error, Result};
use chrono::{Datelike, Months, NaiveDate};

/// Normalises any date to the first day of its month.
#[must_use]
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Parses a `YYYY-MM` string into the first day of that month.
///
/// # Errors
/// Returns `Error::Validation` when the string is not a valid year-month.
pub fn parse_month(value: &str) -> Result<NaiveDate> {
    let invalid = || Error::Validation {
        message: format!("Invalid month '{value}': expected YYYY-MM (e.g. 2025-01)"),
    };
    let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)
}

/// First day of the month before `month`.
#[must_use]
pub fn previous_month(month: NaiveDate) -> NaiveDate {
    month_start(month)
        .checked_sub_months(Months::new(1))
        .unwrap_or(month)
}

/// `YYYY-MM` label.
#[must_use]
pub fn month_key(month: NaiveDate) -> String {
    month.format("%Y-%m").to_string()
}

/// `YYYY_MM` label used in artifact names.
#[must_use]
pub fn month_slug(month: NaiveDate) -> String {
    month.format("%Y_%m").to_string()
}
