use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use nalgebra::{DMatrix, DVector};
use statrs::statistics::Statistics;
use std::fs::File;
use tracing::{debug, info};

use super::features::{feature_matrix, CovidWindow, FeatureRow};
use super::scaler::MinMaxScaler;
use crate::config::DataConfig;
use crate::error::DataError;

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    pub date: NaiveDate,
    pub raw_value: f64,
    pub normalized_value: f64,
    pub features: FeatureRow,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TimeSeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Monthly series, sorted by date, normalized once at load.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<TimeSeriesRecord>,
}

impl Dataset {
    /// Reads the CSV and fits the scaler used later to invert predictions.
    pub fn load(
        config: &DataConfig,
        covid: &CovidWindow,
    ) -> Result<(Self, MinMaxScaler), DataError> {
        info!("Loading dataset from {}", config.csv_path.display());

        let file = File::open(&config.csv_path).map_err(|source| DataError::Io {
            path: config.csv_path.clone(),
            source,
        })?;

        Self::from_reader(file, config, covid)
    }

    pub fn from_reader<R: std::io::Read>(
        reader: R,
        config: &DataConfig,
        covid: &CovidWindow,
    ) -> Result<(Self, MinMaxScaler), DataError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let date_idx = column_index(&headers, &config.date_column)?;
        let value_idx = column_index(&headers, &config.value_column)?;

        let mut points: Vec<(NaiveDateTime, f64)> = Vec::new();
        for (i, row) in rdr.records().enumerate() {
            let row = row?;
            // Header is line 1.
            let line = i + 2;

            let raw_date = row.get(date_idx).unwrap_or_default();
            let timestamp = parse_timestamp(raw_date).ok_or_else(|| DataError::InvalidDate {
                line,
                value: raw_date.to_string(),
            })?;

            let raw_value = row.get(value_idx).unwrap_or_default();
            let value = raw_value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| DataError::InvalidValue {
                    line,
                    value: raw_value.to_string(),
                })?;

            points.push((timestamp, value));
        }

        if points.is_empty() {
            return Err(DataError::Empty);
        }

        points.sort_by_key(|(timestamp, _)| *timestamp);

        let mut normalized: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let scaler = MinMaxScaler::fit_transform(&mut normalized)?;

        let records: Vec<TimeSeriesRecord> = points
            .into_iter()
            .zip(normalized)
            .map(|((timestamp, raw_value), normalized_value)| TimeSeriesRecord {
                date: timestamp.date(),
                raw_value,
                normalized_value,
                features: FeatureRow::new(timestamp.date(), covid.covid_flag_at(timestamp)),
            })
            .collect();

        debug!(
            "Parsed {} records, scaler min={} max={}",
            records.len(),
            scaler.min,
            scaler.max
        );

        Ok((Self { records }, scaler))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.records.first()?.date, self.records.last()?.date))
    }

    pub fn feature_matrix(&self) -> DMatrix<f64> {
        let rows: Vec<FeatureRow> = self.records.iter().map(|r| r.features).collect();
        feature_matrix(&rows)
    }

    /// Normalized values, aligned with `feature_matrix` rows.
    pub fn targets(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.records.len(),
            self.records.iter().map(|r| r.normalized_value),
        )
    }

    /// Statistics of the raw, unscaled column.
    pub fn statistics(&self) -> TimeSeriesStats {
        if self.is_empty() {
            return TimeSeriesStats::default();
        }

        let values: Vec<f64> = self.records.iter().map(|r| r.raw_value).collect();

        TimeSeriesStats {
            mean: values.iter().mean(),
            std_dev: if values.len() > 1 { values.iter().std_dev() } else { 0.0 },
            min: Statistics::min(values.iter()),
            max: Statistics::max(values.iter()),
            count: self.len(),
        }
    }
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize, DataError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| DataError::MissingColumn(name.to_string()))
}

/// Date-only values are read as midnight.
fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    let value = value.trim();

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .or_else(|| NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
