// External imports
use anyhow::Result;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;
use burn::tensor::{Tensor, TensorData};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

// Internal imports
use super::step_1_series_preparation::{build_training_windows, TimeSeries, TrainingWindow};
use super::step_3_rnn_model_arch::{RnnModelConfig, TimeSeriesRnn};
use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_LEARNING_RATE, DEFAULT_N_EPOCHS};
use crate::error::ForecastError;

/// Training options accepted through the forecaster's passthrough map
///
/// This is the allow-list: any other key is rejected when the options are
/// parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RnnTrainerOptions {
    pub n_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub max_samples_per_ts: Option<usize>,
}

impl Default for RnnTrainerOptions {
    fn default() -> Self {
        Self {
            n_epochs: DEFAULT_N_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            max_samples_per_ts: None,
        }
    }
}

impl RnnTrainerOptions {
    /// Parse and validate a passthrough option map
    pub fn from_options(
        options: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ForecastError> {
        let parsed: Self = serde_json::from_value(serde_json::Value::Object(options.clone()))
            .map_err(|e| ForecastError::InvalidHyperparameter(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidHyperparameter(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ForecastError::InvalidHyperparameter(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.max_samples_per_ts == Some(0) {
            return Err(ForecastError::InvalidHyperparameter(
                "max_samples_per_ts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stack windows into `[batch, training_length, input_size]` inputs and
/// `[batch, training_length, 1]` targets
fn windows_to_tensors<B: AutodiffBackend>(
    windows: &[&TrainingWindow],
    training_length: usize,
    input_size: usize,
    device: &B::Device,
) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let batch_size = windows.len();
    let inputs: Vec<f32> = windows.iter().flat_map(|w| w.inputs.iter().copied()).collect();
    let targets: Vec<f32> = windows.iter().flat_map(|w| w.targets.iter().copied()).collect();

    let inputs = Tensor::<B, 3>::from_data(
        TensorData::new(inputs, [batch_size, training_length, input_size]),
        device,
    );
    let targets = Tensor::<B, 3>::from_data(
        TensorData::new(targets, [batch_size, training_length, 1]),
        device,
    );
    (inputs, targets)
}

/// Train one shared network over every series
///
/// # Arguments
///
/// * `config` - Architecture of the network to build
/// * `options` - Epochs, batch size, learning rate and sample cap
/// * `training_length` - Window length used for the training samples
/// * `series` - Scaled target series
/// * `future_covariates` - Optional covariate series aligned with `series`
/// * `rng` - Seeded generator used to shuffle windows each epoch
/// * `device` - Device to train on
///
/// # Returns
///
/// Returns the trained model and the mean training loss of each epoch
pub fn train_rnn<B: AutodiffBackend>(
    config: &RnnModelConfig,
    options: &RnnTrainerOptions,
    training_length: usize,
    series: &[TimeSeries],
    future_covariates: Option<&[TimeSeries]>,
    rng: &mut StdRng,
    device: &B::Device,
) -> Result<(TimeSeriesRnn<B>, Vec<f64>)> {
    let windows = build_training_windows(
        series,
        future_covariates,
        training_length,
        options.max_samples_per_ts,
    )?;
    info!(
        "Training {} network on {} windows from {} series",
        config.kind,
        windows.len(),
        series.len()
    );

    let mut model: TimeSeriesRnn<B> = config.init(device);
    let mut optimizer = AdamConfig::new().init::<B, TimeSeriesRnn<B>>();

    let mut order: Vec<usize> = (0..windows.len()).collect();
    let mut loss_history = Vec::with_capacity(options.n_epochs);

    for epoch in 1..=options.n_epochs {
        order.shuffle(rng);

        let mut epoch_loss = 0.0;
        let mut num_batches = 0usize;
        for chunk in order.chunks(options.batch_size) {
            let batch: Vec<&TrainingWindow> = chunk.iter().map(|&i| &windows[i]).collect();
            let (inputs, targets) =
                windows_to_tensors::<B>(&batch, training_length, config.input_size, device);

            // MSE over every step of every window
            let predictions = model.forward(inputs);
            let diff = predictions - targets;
            let loss = (diff.clone() * diff).mean();
            epoch_loss += loss.clone().into_scalar().to_f64();
            num_batches += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(options.learning_rate, model, grads);
        }

        let avg_loss = epoch_loss / num_batches.max(1) as f64;
        debug!("Epoch {}/{}: train loss = {:.6}", epoch, options.n_epochs, avg_loss);
        loss_history.push(avg_loss);
    }

    if let Some(last) = loss_history.last() {
        info!("Training completed, final loss = {:.6}", last);
    }
    Ok((model, loss_history))
}
