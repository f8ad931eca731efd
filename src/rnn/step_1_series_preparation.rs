// External crates
use ndarray::{concatenate, s, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

// Internal modules
use crate::error::ForecastError;

/// A univariate or multivariate series indexed by integer time step
///
/// Values are stored as `[time, component]`. Step 0 is the first retained
/// observation; target series and the covariate series prepared alongside
/// them share that origin, so position `t` means the same instant in both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSeries {
    components: Vec<String>,
    values: Array2<f64>,
}

impl TimeSeries {
    pub fn new(components: Vec<String>, values: Array2<f64>) -> Result<Self, ForecastError> {
        if components.len() != values.ncols() {
            return Err(ForecastError::LengthMismatch {
                expected: components.len(),
                actual: values.ncols(),
            });
        }
        Ok(Self { components, values })
    }

    /// Single-component series
    pub fn univariate(name: &str, values: Vec<f64>) -> Self {
        let len = values.len();
        let values = Array2::from_shape_vec((len, 1), values)
            .unwrap_or_else(|_| Array2::zeros((0, 1)));
        Self {
            components: vec![name.to_string()],
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// All components at time step `t`
    pub fn row(&self, t: usize) -> ArrayView1<'_, f64> {
        self.values.row(t)
    }

    /// The most recent `n` steps (the whole series if shorter)
    pub fn tail(&self, n: usize) -> Self {
        let start = self.len().saturating_sub(n);
        Self {
            components: self.components.clone(),
            values: self.values.slice(s![start.., ..]).to_owned(),
        }
    }

    /// Append `other` after the last step of `self`
    pub fn append(&self, other: &TimeSeries) -> Result<Self, ForecastError> {
        if self.components != other.components {
            return Err(ForecastError::LengthMismatch {
                expected: self.width(),
                actual: other.width(),
            });
        }
        let values = concatenate(Axis(0), &[self.values.view(), other.values.view()])
            .map_err(|_| ForecastError::LengthMismatch {
                expected: self.width(),
                actual: other.width(),
            })?;
        Ok(Self {
            components: self.components.clone(),
            values,
        })
    }

    /// First component as a plain vector
    pub fn first_component(&self) -> Vec<f64> {
        self.values.column(0).to_vec()
    }
}

/// One training sample: `training_length` input steps and the targets one step ahead
#[derive(Debug, Clone)]
pub struct TrainingWindow {
    /// Flattened `[training_length, input_size]`
    pub inputs: Vec<f32>,
    /// Flattened `[training_length, 1]`
    pub targets: Vec<f32>,
}

/// Number of features fed to the network per step
pub fn input_size(future_covariates: Option<&[TimeSeries]>) -> usize {
    1 + future_covariates
        .and_then(|covs| covs.first())
        .map(TimeSeries::width)
        .unwrap_or(0)
}

/// Build the input vector for step `t`: the target at `t` followed by
/// the future covariates at `t + 1`
pub fn step_features(target: f64, covariates: Option<ArrayView1<'_, f64>>) -> Vec<f32> {
    let mut features = Vec::with_capacity(1 + covariates.map(|c| c.len()).unwrap_or(0));
    features.push(target as f32);
    if let Some(covariates) = covariates {
        features.extend(covariates.iter().map(|&v| v as f32));
    }
    features
}

/// Cut every target series into shifted training windows
///
/// Each window starts at `s` and spans `training_length` steps. Step `j` of
/// the window sees the target at `s + j` together with the future covariates
/// at `s + j + 1`, and is trained to output the target at `s + j + 1`.
/// A series of length `n` yields `n - training_length` windows; when
/// `max_samples_per_ts` is set only the most recent windows are kept.
///
/// # Arguments
///
/// * `series` - Scaled target series, one component each
/// * `future_covariates` - Optional covariate series aligned with `series`
/// * `training_length` - Window length
/// * `max_samples_per_ts` - Optional cap on windows per series
///
/// # Returns
///
/// Returns the windows of all series, series by series
pub fn build_training_windows(
    series: &[TimeSeries],
    future_covariates: Option<&[TimeSeries]>,
    training_length: usize,
    max_samples_per_ts: Option<usize>,
) -> Result<Vec<TrainingWindow>, ForecastError> {
    if training_length == 0 {
        return Err(ForecastError::InvalidHyperparameter(
            "training_length must be at least 1".to_string(),
        ));
    }
    if let Some(covs) = future_covariates {
        if covs.len() != series.len() {
            return Err(ForecastError::LengthMismatch {
                expected: series.len(),
                actual: covs.len(),
            });
        }
    }

    let mut windows = Vec::new();
    for (index, target) in series.iter().enumerate() {
        let required = training_length + 1;
        if target.len() < required {
            return Err(ForecastError::InsufficientData {
                what: format!("training series {}", index),
                required,
                actual: target.len(),
            });
        }
        let covariates = future_covariates.map(|covs| &covs[index]);
        if let Some(covariates) = covariates {
            if covariates.len() < target.len() {
                return Err(ForecastError::InsufficientData {
                    what: format!("future covariates of series {}", index),
                    required: target.len(),
                    actual: covariates.len(),
                });
            }
        }

        let num_windows = target.len() - training_length;
        let first = match max_samples_per_ts {
            Some(cap) if cap < num_windows => num_windows - cap,
            _ => 0,
        };

        for start in first..num_windows {
            let mut inputs = Vec::new();
            let mut targets = Vec::with_capacity(training_length);
            for j in 0..training_length {
                let t = start + j;
                let covariate_row = covariates.map(|c| c.row(t + 1));
                inputs.extend(step_features(target.row(t)[0], covariate_row));
                targets.push(target.row(t + 1)[0] as f32);
            }
            windows.push(TrainingWindow { inputs, targets });
        }
    }

    Ok(windows)
}
