use statrs::statistics::Statistics;

use crate::error::DataError;

/// Min-max transform onto [0, 1], fitted once on the raw value column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Result<Self, DataError> {
        if values.is_empty() {
            return Err(DataError::Empty);
        }

        Ok(Self {
            min: Statistics::min(values.iter()),
            max: Statistics::max(values.iter()),
        })
    }

    /// A constant column scales by 1 so the transform stays invertible.
    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range.abs() < f64::EPSILON {
            1.0
        } else {
            range
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn inverse_transform(&self, value: f64) -> f64 {
        value * self.range() + self.min
    }

    pub fn fit_transform(values: &mut [f64]) -> Result<Self, DataError> {
        let scaler = Self::fit(values)?;
        for value in values.iter_mut() {
            *value = scaler.transform(*value);
        }
        Ok(scaler)
    }
}
