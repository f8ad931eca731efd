// External imports
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use polars::prelude::*;
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard};

// Internal imports
use crate::forecaster::ForecastingSchema;

pub type TestBackend = Autodiff<NdArray<f32>>;

pub const STEPS: i64 = 30;
pub const HORIZON: usize = 5;

static BACKEND_RNG: Mutex<()> = Mutex::new(());

/// NdArray draws initial weights from one process-wide RNG; tests that seed or
/// initialize networks hold this guard so seeded runs stay reproducible
pub fn backend_rng_guard() -> MutexGuard<'static, ()> {
    BACKEND_RNG.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Level of series `id` at step `t`; "b" lives in [100, 110], everything else in [0, 10]
pub fn level(id: &str, t: i64) -> f64 {
    let offset = if id == "b" { 100.0 } else { 0.0 };
    offset + 5.0 + 5.0 * (t as f64 / 3.0).sin()
}

pub fn schema(past_covariates: &[&str], future_covariates: &[&str]) -> ForecastingSchema {
    ForecastingSchema {
        id_col: "series_id".to_string(),
        time_col: "step".to_string(),
        target: "value".to_string(),
        past_covariates: past_covariates.iter().map(|c| c.to_string()).collect(),
        future_covariates: future_covariates.iter().map(|c| c.to_string()).collect(),
        forecast_length: HORIZON,
    }
}

/// Small, fast hyperparameters
pub fn hyperparameters() -> Value {
    json!({
        "input_chunk_length": 6,
        "training_length": 10,
        "hidden_dim": 4,
        "random_state": 42,
        "n_epochs": 2,
        "batch_size": 8,
        "learning_rate": 0.01
    })
}

/// History of series "b" and "a" with rows interleaved by step, "b" seen first
pub fn history_df() -> DataFrame {
    let mut ids = Vec::new();
    let mut steps = Vec::new();
    let mut values = Vec::new();
    let mut temperature = Vec::new();
    let mut holiday = Vec::new();
    for t in 0..STEPS {
        for id in ["b", "a"] {
            ids.push(id);
            steps.push(t);
            values.push(level(id, t));
            temperature.push(20.0 + (t % 4) as f64);
            holiday.push(if t % 7 == 0 { 1.0 } else { 0.0 });
        }
    }
    df!(
        "series_id" => ids,
        "step" => steps,
        "value" => values,
        "temperature" => temperature,
        "holiday" => holiday,
    )
    .unwrap()
}

/// Forecast rows for `ids`, series by series
pub fn test_df(ids: &[&str]) -> DataFrame {
    let mut series_ids = Vec::new();
    let mut steps = Vec::new();
    let mut holiday = Vec::new();
    for id in ids {
        for t in STEPS..STEPS + HORIZON as i64 {
            series_ids.push(*id);
            steps.push(t);
            holiday.push(if t % 7 == 0 { 1.0 } else { 0.0 });
        }
    }
    df!(
        "series_id" => series_ids,
        "step" => steps,
        "holiday" => holiday,
    )
    .unwrap()
}

/// Observed range of series `id` in `history_df`
pub fn observed_range(id: &str) -> (f64, f64) {
    (0..STEPS)
        .map(|t| level(id, t))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

pub fn prediction_values(df: &DataFrame, column: &str) -> Vec<f64> {
    df.column(column)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap())
        .collect()
}
