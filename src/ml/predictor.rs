use chrono::NaiveDate;
use nalgebra::DMatrix;
use std::sync::Arc;
use tracing::debug;

use super::models::Regressor;
use super::registry::ModelRegistry;
use crate::data::{FeatureRow, MinMaxScaler, FEATURE_COLUMNS};
use crate::error::{ForecastError, ModelError};

/// Answers "what does model M predict for year/month" in original units.
#[derive(Clone)]
pub struct Forecaster {
    registry: Arc<ModelRegistry>,
    scaler: MinMaxScaler,
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub model: String,
    pub date: NaiveDate,
    pub normalized: f64,
    pub value: f64,
}

impl Forecaster {
    pub fn new(registry: Arc<ModelRegistry>, scaler: MinMaxScaler) -> Self {
        Self { registry, scaler }
    }

    pub fn model_names(&self) -> &[String] {
        self.registry.names()
    }

    /// Parses raw form fields before delegating to `predict`.
    pub fn predict_raw(
        &self,
        model_name: &str,
        year: &str,
        month: &str,
    ) -> Result<Prediction, ForecastError> {
        let year: i32 = year
            .trim()
            .parse()
            .map_err(|_| ForecastError::InvalidInput(format!("year must be an integer, got {:?}", year)))?;
        let month: u32 = month
            .trim()
            .parse()
            .map_err(|_| ForecastError::InvalidInput(format!("month must be an integer, got {:?}", month)))?;

        self.predict(model_name, year, month)
    }

    pub fn predict(
        &self,
        model_name: &str,
        year: i32,
        month: u32,
    ) -> Result<Prediction, ForecastError> {
        let date = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(ForecastError::InvalidDate { year, month })?;

        // Future months are never flagged as covid.
        let row = FeatureRow::new(date, 0);
        let x = DMatrix::from_row_slice(1, FEATURE_COLUMNS.len(), &row.to_vec());

        let model = self
            .registry
            .get(model_name)
            .ok_or_else(|| ForecastError::UnknownModel(model_name.to_string()))?;

        let normalized = model
            .predict(&x)?
            .iter()
            .next()
            .copied()
            .ok_or_else(|| ModelError::InvalidModel("model returned no prediction".into()))?;
        let value = self.scaler.inverse_transform(normalized);

        debug!(
            "{} predicted {:.4} (normalized {:.6}) for {}",
            model_name, value, normalized, date
        );

        Ok(Prediction {
            model: model_name.to_string(),
            date,
            normalized,
            value,
        })
    }
}
