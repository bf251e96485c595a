//! Single-day reporting period built from the `d`/`m`/`y` request parameters.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::{ExtractError, Result};

/// A one-day date range as the dashboard expects it (`DD/MM/YYYY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

/// The rendered `from`/`to` pair echoed back in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodStrings {
    pub from: String,
    pub to: String,
}

impl Period {
    /// Parse raw query values. Day and month may be given without the
    /// leading zero; the year must have four digits.
    pub fn parse(day: Option<&str>, month: Option<&str>, year: Option<&str>) -> Result<Self> {
        let day = parse_part("d", day, 2)?;
        let month = parse_part("m", month, 2)?;
        let year = parse_part("y", year, 4)?;

        if !(1..=31).contains(&day) {
            return Err(ExtractError::InvalidPeriod(format!("day out of range: {}", day)));
        }
        if !(1..=12).contains(&month) {
            return Err(ExtractError::InvalidPeriod(format!(
                "month out of range: {}",
                month
            )));
        }

        Ok(Self {
            day,
            month,
            year: year as i32,
        })
    }

    /// `DD/MM/YYYY`, the form typed into the picker inputs.
    pub fn formatted(&self) -> String {
        format!("{:02}/{:02}/{:04}", self.day, self.month, self.year)
    }

    /// `YYYY-MM-DD`, the form used in calendar cell `title` attributes.
    pub fn iso(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// Both ends of the range; always equal.
    pub fn strings(&self) -> PeriodStrings {
        let value = self.formatted();
        PeriodStrings {
            from: value.clone(),
            to: value,
        }
    }

    /// Calendar date, if the triplet names a real day.
    pub fn as_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Month index used to compare calendar positions (`year * 12 + month`).
    pub fn month_index(&self) -> i32 {
        self.year * 12 + self.month as i32
    }
}

/// Number of days in the given month, falling back to 31 for invalid input.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(first), Some(next)) => next.signed_duration_since(first).num_days() as u32,
        _ => 31,
    }
}

/// Today's period in local time; used by the CLI when no date is given.
pub fn today() -> Period {
    let now = chrono::Local::now().date_naive();
    Period {
        day: now.day(),
        month: now.month(),
        year: now.year(),
    }
}

fn parse_part(name: &str, raw: Option<&str>, width: usize) -> Result<u32> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ExtractError::InvalidPeriod(format!("missing '{}'", name)));
    }
    if !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ExtractError::InvalidPeriod(format!(
            "'{}' must be numeric, got '{}'",
            name, raw
        )));
    }
    // Short values are zero-padded, but a year must be spelled out in full.
    let padded = format!("{:0>width$}", raw, width = width);
    if padded.len() != width || (width == 4 && raw.len() != 4) {
        return Err(ExtractError::InvalidPeriod(format!(
            "'{}' must have {} digits, got '{}'",
            name, width, raw
        )));
    }
    padded
        .parse()
        .map_err(|_| ExtractError::InvalidPeriod(format!("'{}' is not a number", name)))
}
