//! Calendar features shared by the bulk dataset and per-request inputs.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use nalgebra::DMatrix;

/// Column order every fitted model was trained on.
pub const FEATURE_COLUMNS: [&str; 4] = ["quarter", "month", "year", "covid"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    pub quarter: u32,
    pub month: u32,
    pub year: i32,
}

impl CalendarFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        let month = date.month();
        Self {
            quarter: (month - 1) / 3 + 1,
            month,
            year: date.year(),
        }
    }
}

/// Inclusive range flagged as the covid period. Both bounds are midnight, so
/// any time after midnight on `end` falls outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CovidWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for CovidWindow {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2020, 4, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2020, 8, 1).unwrap_or(NaiveDate::MIN),
        }
    }
}

impl CovidWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn contains_timestamp(&self, ts: NaiveDateTime) -> bool {
        let date = ts.date();
        let at_midnight = ts.num_seconds_from_midnight() == 0 && ts.nanosecond() == 0;
        self.contains(date) && (date < self.end || at_midnight)
    }

    pub fn covid_flag_at(&self, ts: NaiveDateTime) -> u8 {
        u8::from(self.contains_timestamp(ts))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRow {
    pub calendar: CalendarFeatures,
    pub covid: u8,
}

impl FeatureRow {
    pub fn new(date: NaiveDate, covid: u8) -> Self {
        Self {
            calendar: CalendarFeatures::from_date(date),
            covid,
        }
    }

    /// Values in `FEATURE_COLUMNS` order.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.calendar.quarter as f64,
            self.calendar.month as f64,
            self.calendar.year as f64,
            self.covid as f64,
        ]
    }
}

pub fn feature_matrix(rows: &[FeatureRow]) -> DMatrix<f64> {
    let values: Vec<f64> = rows.iter().flat_map(|row| row.to_vec()).collect();
    DMatrix::from_row_slice(rows.len(), FEATURE_COLUMNS.len(), &values)
}
