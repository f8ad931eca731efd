// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;

// Internal imports
use super::step_2_rnn_cell::{RecurrentLayer, RecurrentState};

/// Recurrent cell family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RnnKind {
    #[default]
    #[serde(rename = "RNN")]
    Rnn,
    #[serde(rename = "LSTM")]
    Lstm,
    #[serde(rename = "GRU")]
    Gru,
}

impl RnnKind {
    /// Number of gate blocks in the combined projections
    pub fn gate_count(self) -> usize {
        match self {
            RnnKind::Rnn => 1,
            RnnKind::Gru => 3,
            RnnKind::Lstm => 4,
        }
    }
}

impl fmt::Display for RnnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RnnKind::Rnn => "RNN",
            RnnKind::Lstm => "LSTM",
            RnnKind::Gru => "GRU",
        };
        write!(f, "{}", name)
    }
}

/// Architecture of a `TimeSeriesRnn`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RnnModelConfig {
    pub kind: RnnKind,
    pub input_size: usize,
    pub hidden_dim: usize,
    pub n_rnn_layers: usize,
    pub dropout: f64,
}

impl RnnModelConfig {
    pub fn new(
        kind: RnnKind,
        input_size: usize,
        hidden_dim: usize,
        n_rnn_layers: usize,
        dropout: f64,
    ) -> Self {
        Self {
            kind,
            input_size,
            hidden_dim,
            n_rnn_layers,
            dropout,
        }
    }

    /// Initialize a model from this configuration
    pub fn init<B: Backend>(&self, device: &B::Device) -> TimeSeriesRnn<B> {
        TimeSeriesRnn::new(
            self.kind,
            self.input_size,
            self.hidden_dim,
            self.n_rnn_layers,
            self.dropout,
            device,
        )
    }
}

/// Stacked recurrent network emitting one forecast value per time step
///
/// ## Architecture
///
/// 1. `n_rnn_layers` recurrent layers of the configured kind
/// 2. Dropout between consecutive recurrent layers (not after the last one)
/// 3. Linear head projecting each hidden state to the next target value
#[derive(Module, Debug)]
pub struct TimeSeriesRnn<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    layers: Vec<RecurrentLayer<B>>,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> TimeSeriesRnn<B> {
    pub fn new(
        kind: RnnKind,
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout_prob: f64,
        device: &B::Device,
    ) -> Self {
        let num_layers = num_layers.max(1);
        let layers = (0..num_layers)
            .map(|layer| {
                let layer_input = if layer == 0 { input_size } else { hidden_size };
                RecurrentLayer::new(layer_input, hidden_size, kind.gate_count(), device)
            })
            .collect();

        Self {
            input_size,
            hidden_size,
            layers,
            dropout: DropoutConfig::new(dropout_prob).init(),
            output: LinearConfig::new(hidden_size, 1).init(device),
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Forward pass from a zero state
    ///
    /// # Arguments
    ///
    /// * `x` - Input of shape [batch_size, seq_len, input_size]
    ///
    /// # Returns
    ///
    /// Returns the per-step forecasts of shape [batch_size, seq_len, 1]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.forward_with_state(x, None).0
    }

    /// Forward pass continuing from per-layer states
    ///
    /// Returns the per-step forecasts and the per-layer states after the last
    /// step, ready to be fed back for the next call.
    pub fn forward_with_state(
        &self,
        x: Tensor<B, 3>,
        states: Option<Vec<RecurrentState<B>>>,
    ) -> (Tensor<B, 3>, Vec<RecurrentState<B>>) {
        let mut states = states.map(|s| s.into_iter().map(Some).collect::<Vec<_>>());
        let last_layer = self.layers.len() - 1;

        let mut sequence = x;
        let mut final_states = Vec::with_capacity(self.layers.len());
        for (index, layer) in self.layers.iter().enumerate() {
            let initial = states.as_mut().and_then(|s| s.get_mut(index)).and_then(Option::take);
            let (output, state) = layer.forward(sequence, initial);
            final_states.push(state);

            sequence = if index < last_layer {
                self.dropout.forward(output)
            } else {
                output
            };
        }

        (self.output.forward(sequence), final_states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::test_data::backend_rng_guard;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_rnn_kind_names() {
        assert_eq!(serde_json::to_string(&RnnKind::Lstm).unwrap(), "\"LSTM\"");
        let kind: RnnKind = serde_json::from_str("\"GRU\"").unwrap();
        assert_eq!(kind, RnnKind::Gru);
        assert_eq!(RnnKind::default(), RnnKind::Rnn);
        assert_eq!(RnnKind::Rnn.to_string(), "RNN");
    }

    #[test]
    fn test_model_creation() {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        let config = RnnModelConfig::new(RnnKind::Lstm, 3, 16, 2, 0.1);
        let model: TimeSeriesRnn<TestBackend> = config.init(&device);

        assert_eq!(model.input_size(), 3);
        assert_eq!(model.hidden_size(), 16);
        assert_eq!(model.num_layers(), 2);
        assert_eq!(model.output.weight.dims(), [16, 1]);
    }

    #[test]
    fn test_model_forward_shapes() {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        for kind in [RnnKind::Rnn, RnnKind::Lstm, RnnKind::Gru] {
            let model: TimeSeriesRnn<TestBackend> = TimeSeriesRnn::new(kind, 2, 8, 3, 0.0, &device);
            let input = Tensor::<TestBackend, 3>::ones([4, 7, 2], &device);

            let (output, states) = model.forward_with_state(input, None);

            assert_eq!(output.dims(), [4, 7, 1]);
            assert_eq!(states.len(), 3);
        }
    }

    #[test]
    fn test_state_continuation_matches_full_sequence() {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        let model: TimeSeriesRnn<TestBackend> =
            TimeSeriesRnn::new(RnnKind::Gru, 1, 6, 2, 0.0, &device);
        let input = Tensor::<TestBackend, 3>::random(
            [2, 8, 1],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );

        let full = model.forward(input.clone());
        let (_, states) = model.forward_with_state(input.clone().narrow(1, 0, 5), None);
        let (tail, _) = model.forward_with_state(input.narrow(1, 5, 3), Some(states));

        let diff: f32 = (full.narrow(1, 5, 3) - tail).abs().max().into_scalar();
        assert!(diff < 1e-5);
    }
}
