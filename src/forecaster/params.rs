// External crates
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Local modules
use crate::constants::{
    DEFAULT_DROPOUT, DEFAULT_HIDDEN_DIM, DEFAULT_N_RNN_LAYERS, DEFAULT_RANDOM_STATE,
    DEFAULT_TRAINING_LENGTH,
};
use crate::error::ForecastError;
use crate::rnn::{RnnKind, RnnModelSettings, RnnTrainerOptions};

fn default_hidden_dim() -> usize {
    DEFAULT_HIDDEN_DIM
}

fn default_n_rnn_layers() -> usize {
    DEFAULT_N_RNN_LAYERS
}

fn default_dropout() -> f64 {
    DEFAULT_DROPOUT
}

fn default_training_length() -> usize {
    DEFAULT_TRAINING_LENGTH
}

fn default_random_state() -> Option<u64> {
    Some(DEFAULT_RANDOM_STATE)
}

/// Forecaster hyperparameters as supplied by the serving harness
///
/// Keys other than the named fields are collected into `options` and handed
/// to the RNN layer, which decides whether it recognizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterParams {
    /// Past steps fed to the network before forecasting
    pub input_chunk_length: usize,
    #[serde(default)]
    pub model: RnnKind,
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
    #[serde(default = "default_n_rnn_layers")]
    pub n_rnn_layers: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    /// Window length of the training samples; should exceed `input_chunk_length`
    #[serde(default = "default_training_length")]
    pub training_length: usize,
    #[serde(default = "default_random_state")]
    pub random_state: Option<u64>,
    /// Keep only the most recent rows of every series
    #[serde(default)]
    pub history_length: Option<usize>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ForecasterParams {
    /// Defaults for everything except the input chunk length
    pub fn new(input_chunk_length: usize) -> Self {
        Self {
            input_chunk_length,
            model: RnnKind::default(),
            hidden_dim: DEFAULT_HIDDEN_DIM,
            n_rnn_layers: DEFAULT_N_RNN_LAYERS,
            dropout: DEFAULT_DROPOUT,
            training_length: DEFAULT_TRAINING_LENGTH,
            random_state: default_random_state(),
            history_length: None,
            options: Map::new(),
        }
    }

    /// Parse hyperparameters from a JSON object
    pub fn from_json(value: &Value) -> Result<Self> {
        let params: Self = serde_json::from_value(value.clone())
            .context("Failed to parse forecaster hyperparameters")?;
        Ok(params)
    }

    /// Set one passthrough option
    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    /// Settings for the RNN layer; the passthrough options are validated there
    pub fn rnn_settings(&self) -> Result<RnnModelSettings, ForecastError> {
        Ok(RnnModelSettings {
            kind: self.model,
            input_chunk_length: self.input_chunk_length,
            hidden_dim: self.hidden_dim,
            n_rnn_layers: self.n_rnn_layers,
            dropout: self.dropout,
            training_length: self.training_length,
            trainer: RnnTrainerOptions::from_options(&self.options)?,
        })
    }
}
