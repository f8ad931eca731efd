//! `RnnModel`: configure, fit, predict, save and load a shared recurrent forecaster.

use anyhow::{bail, Result};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use log::info;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::step_1_series_preparation::{input_size, TimeSeries};
use super::step_3_rnn_model_arch::{RnnKind, RnnModelConfig, TimeSeriesRnn};
use super::step_4_train_model::{train_rnn, RnnTrainerOptions};
use super::step_5_prediction::forecast;
use super::step_6_model_serialization::{
    load_model_with_metadata, save_model_with_metadata, verify_model,
};
use crate::error::ForecastError;

/// Everything needed to build and train the network, minus the input width
/// which is only known once the training series are seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RnnModelSettings {
    pub kind: RnnKind,
    pub input_chunk_length: usize,
    pub hidden_dim: usize,
    pub n_rnn_layers: usize,
    pub dropout: f64,
    pub training_length: usize,
    pub trainer: RnnTrainerOptions,
}

impl RnnModelSettings {
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.input_chunk_length == 0 {
            return Err(ForecastError::InvalidHyperparameter(
                "input_chunk_length must be at least 1".to_string(),
            ));
        }
        if self.training_length == 0 {
            return Err(ForecastError::InvalidHyperparameter(
                "training_length must be at least 1".to_string(),
            ));
        }
        if self.hidden_dim == 0 || self.n_rnn_layers == 0 {
            return Err(ForecastError::InvalidHyperparameter(
                "hidden_dim and n_rnn_layers must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::InvalidHyperparameter(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        self.trainer.validate()
    }
}

/// Shared recurrent forecaster over many series
pub struct RnnModel<B: AutodiffBackend> {
    settings: RnnModelSettings,
    config: Option<RnnModelConfig>,
    network: Option<TimeSeriesRnn<B>>,
    device: B::Device,
}

impl<B: AutodiffBackend> RnnModel<B> {
    pub fn new(settings: RnnModelSettings, device: B::Device) -> Result<Self, ForecastError> {
        settings.validate()?;
        Ok(Self {
            settings,
            config: None,
            network: None,
            device,
        })
    }

    pub fn settings(&self) -> &RnnModelSettings {
        &self.settings
    }

    /// Architecture of the trained network, `None` before `fit`
    pub fn config(&self) -> Option<&RnnModelConfig> {
        self.config.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.network.is_some()
    }

    /// Train one network over all `series`
    ///
    /// Returns the mean loss of every epoch.
    pub fn fit(
        &mut self,
        series: &[TimeSeries],
        future_covariates: Option<&[TimeSeries]>,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>> {
        let config = RnnModelConfig::new(
            self.settings.kind,
            input_size(future_covariates),
            self.settings.hidden_dim,
            self.settings.n_rnn_layers,
            self.settings.dropout,
        );

        let (network, losses) = train_rnn::<B>(
            &config,
            &self.settings.trainer,
            self.settings.training_length,
            series,
            future_covariates,
            rng,
            &self.device,
        )?;

        self.config = Some(config);
        self.network = Some(network);
        Ok(losses)
    }

    /// Forecast `n` scaled steps per series
    pub fn predict(
        &self,
        n: usize,
        series: &[TimeSeries],
        future_covariates: Option<&[TimeSeries]>,
    ) -> Result<Vec<Vec<f64>>> {
        let network = self.network.as_ref().ok_or(ForecastError::NotFitted)?;
        let expected = network.input_size();
        let actual = input_size(future_covariates);
        if expected != actual {
            return Err(ForecastError::LengthMismatch { expected, actual }.into());
        }

        forecast(
            &network.valid(),
            n,
            self.settings.input_chunk_length,
            series,
            future_covariates,
            &self.device,
        )
    }

    /// Write the native artifact (weights plus architecture sidecar)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let (network, config) = match (&self.network, &self.config) {
            (Some(network), Some(config)) => (network, config),
            _ => return Err(ForecastError::NotFitted.into()),
        };
        save_model_with_metadata(network, config, &path)?;
        info!("Saved RNN weights to {}", path.as_ref().display());
        Ok(())
    }

    /// Rebuild a fitted model from a native artifact
    pub fn load(
        settings: RnnModelSettings,
        path: impl AsRef<Path>,
        device: B::Device,
    ) -> Result<Self> {
        if !verify_model(&path)? {
            bail!(
                "No saved RNN model at {} (weights or config sidecar missing)",
                path.as_ref().display()
            );
        }
        let (network, metadata) = load_model_with_metadata::<B>(&path, &device)?;
        info!(
            "Loaded {} weights (version {}) from {}",
            metadata.config.kind,
            metadata.version,
            path.as_ref().display()
        );
        Ok(Self {
            settings,
            config: Some(metadata.config),
            network: Some(network),
            device,
        })
    }
}
