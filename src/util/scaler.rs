// External crates
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

// Local modules
use crate::error::ForecastError;

/// Min-max scaler mapping every column of a matrix linearly into [0, 1]
///
/// One scaler is fit over a whole `[rows, columns]` matrix; the minimum and
/// maximum are tracked per column. A column whose observed range is zero is
/// scaled by 1, so its values map to 0 and invert back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinMaxScaler {
    data_min: Option<Array1<f64>>,
    data_max: Option<Array1<f64>>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self {
            data_min: None,
            data_max: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.data_min.is_some() && self.data_max.is_some()
    }

    /// Per-column minimum seen during `fit`
    pub fn data_min(&self) -> Option<&Array1<f64>> {
        self.data_min.as_ref()
    }

    /// Per-column maximum seen during `fit`
    pub fn data_max(&self) -> Option<&Array1<f64>> {
        self.data_max.as_ref()
    }

    /// Learn per-column min and max, ignoring NaN values
    pub fn fit(&mut self, data: &Array2<f64>) -> Result<(), ForecastError> {
        if data.nrows() == 0 {
            return Err(ForecastError::InsufficientData {
                what: "min-max scaler fit".to_string(),
                required: 1,
                actual: 0,
            });
        }

        let mins = data.map_axis(Axis(0), |column| {
            column
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .fold(f64::INFINITY, f64::min)
        });
        let maxs = data.map_axis(Axis(0), |column| {
            column
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .fold(f64::NEG_INFINITY, f64::max)
        });

        self.data_min = Some(mins);
        self.data_max = Some(maxs);
        Ok(())
    }

    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, ForecastError> {
        let (mins, scales) = self.parameters(data.ncols())?;
        let mut result = data.clone();
        for (mut column, (min, scale)) in result
            .axis_iter_mut(Axis(1))
            .zip(mins.iter().zip(scales.iter()))
        {
            column.mapv_inplace(|v| (v - min) / scale);
        }
        Ok(result)
    }

    pub fn fit_transform(&mut self, data: &Array2<f64>) -> Result<Array2<f64>, ForecastError> {
        self.fit(data)?;
        self.transform(data)
    }

    pub fn inverse_transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, ForecastError> {
        let (mins, scales) = self.parameters(data.ncols())?;
        let mut result = data.clone();
        for (mut column, (min, scale)) in result
            .axis_iter_mut(Axis(1))
            .zip(mins.iter().zip(scales.iter()))
        {
            column.mapv_inplace(|v| v * scale + min);
        }
        Ok(result)
    }

    /// Column minimums and effective ranges, checked against `num_columns`
    fn parameters(&self, num_columns: usize) -> Result<(Array1<f64>, Array1<f64>), ForecastError> {
        let (mins, maxs) = match (&self.data_min, &self.data_max) {
            (Some(mins), Some(maxs)) => (mins, maxs),
            _ => return Err(ForecastError::NotFitted),
        };
        if mins.len() != num_columns {
            return Err(ForecastError::LengthMismatch {
                expected: mins.len(),
                actual: num_columns,
            });
        }
        let scales = (maxs - mins).mapv(|range| {
            if range.is_finite() && range > 0.0 {
                range
            } else {
                1.0
            }
        });
        Ok((mins.clone(), scales))
    }
}

impl Default for MinMaxScaler {
    fn default() -> Self {
        Self::new()
    }
}
