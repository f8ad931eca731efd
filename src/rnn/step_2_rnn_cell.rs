// External imports
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};

/// Hidden state carried between time steps
///
/// `cell` is only used by LSTM layers; RNN and GRU layers keep it untouched.
#[derive(Debug, Clone)]
pub struct RecurrentState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub cell: Tensor<B, 2>,
}

impl<B: Backend> RecurrentState<B> {
    pub fn zeros(batch_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        Self {
            hidden: Tensor::zeros([batch_size, hidden_size], device),
            cell: Tensor::zeros([batch_size, hidden_size], device),
        }
    }
}

/// One recurrent layer covering the Elman RNN, GRU and LSTM cells
///
/// All gates share a single input projection and a single hidden projection
/// of width `gate_count * hidden_size`. The gate count identifies the cell:
/// 1 for a tanh RNN, 3 for a GRU (r, z, n) and 4 for an LSTM (i, f, g, o).
#[derive(Module, Debug)]
pub struct RecurrentLayer<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    gate_count: usize,

    input_weights: Linear<B>,
    hidden_weights: Linear<B>,
}

impl<B: Backend> RecurrentLayer<B> {
    /// Create a new recurrent layer
    ///
    /// # Arguments
    ///
    /// * `input_size` - Number of input features per step
    /// * `hidden_size` - Size of the hidden state
    /// * `gate_count` - 1 (RNN), 3 (GRU) or 4 (LSTM)
    /// * `device` - Device to place the weights on
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        gate_count: usize,
        device: &B::Device,
    ) -> Self {
        let gate_size = gate_count * hidden_size;
        let input_weights = LinearConfig::new(input_size, gate_size).init(device);
        let hidden_weights = LinearConfig::new(hidden_size, gate_size).init(device);

        Self {
            input_size,
            hidden_size,
            gate_count,
            input_weights,
            hidden_weights,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn gate_count(&self) -> usize {
        self.gate_count
    }

    fn gate(&self, projection: &Tensor<B, 2>, index: usize) -> Tensor<B, 2> {
        projection
            .clone()
            .narrow(1, index * self.hidden_size, self.hidden_size)
    }

    /// Advance one time step
    ///
    /// # Arguments
    ///
    /// * `x_t` - Input of shape [batch_size, input_size]
    /// * `state` - State after the previous step
    ///
    /// # Returns
    ///
    /// Returns the state after this step
    pub fn step(&self, x_t: Tensor<B, 2>, state: RecurrentState<B>) -> RecurrentState<B> {
        let input_projection = self.input_weights.forward(x_t);
        let hidden_projection = self.hidden_weights.forward(state.hidden.clone());

        match self.gate_count {
            4 => {
                let gates = input_projection + hidden_projection;
                let i = activation::sigmoid(self.gate(&gates, 0));
                let f = activation::sigmoid(self.gate(&gates, 1));
                let g = activation::tanh(self.gate(&gates, 2));
                let o = activation::sigmoid(self.gate(&gates, 3));

                let cell = f * state.cell + i * g;
                let hidden = o * activation::tanh(cell.clone());
                RecurrentState { hidden, cell }
            }
            3 => {
                let r = activation::sigmoid(
                    self.gate(&input_projection, 0) + self.gate(&hidden_projection, 0),
                );
                let z = activation::sigmoid(
                    self.gate(&input_projection, 1) + self.gate(&hidden_projection, 1),
                );
                // Reset gate scales the hidden projection, bias included
                let n = activation::tanh(
                    self.gate(&input_projection, 2) + r * self.gate(&hidden_projection, 2),
                );

                let hidden = (Tensor::ones_like(&z) - z.clone()) * n + z * state.hidden;
                RecurrentState {
                    hidden,
                    cell: state.cell,
                }
            }
            _ => {
                let hidden = activation::tanh(input_projection + hidden_projection);
                RecurrentState {
                    hidden,
                    cell: state.cell,
                }
            }
        }
    }

    /// Unroll the layer over a whole sequence
    ///
    /// # Arguments
    ///
    /// * `x` - Input of shape [batch_size, seq_len, input_size]
    /// * `state` - Initial state, zeros when `None`
    ///
    /// # Returns
    ///
    /// Returns the hidden states of shape [batch_size, seq_len, hidden_size]
    /// together with the final state
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        state: Option<RecurrentState<B>>,
    ) -> (Tensor<B, 3>, RecurrentState<B>) {
        let [batch_size, seq_len, _] = x.dims();
        let device = x.device();
        let mut state =
            state.unwrap_or_else(|| RecurrentState::zeros(batch_size, self.hidden_size, &device));

        let mut outputs = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let x_t = x
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, self.input_size]);
            state = self.step(x_t, state);
            outputs.push(state.hidden.clone());
        }

        (Tensor::stack::<3>(outputs, 1), state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::test_data::backend_rng_guard;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shapes_for_every_cell() {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        for gate_count in [1, 3, 4] {
            let layer: RecurrentLayer<TestBackend> = RecurrentLayer::new(3, 8, gate_count, &device);
            let input = Tensor::<TestBackend, 3>::ones([2, 5, 3], &device);

            let (output, state) = layer.forward(input, None);

            assert_eq!(output.dims(), [2, 5, 8]);
            assert_eq!(state.hidden.dims(), [2, 8]);
            assert_eq!(state.cell.dims(), [2, 8]);
        }
    }

    #[test]
    fn test_gate_projection_width() {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        let layer: RecurrentLayer<TestBackend> = RecurrentLayer::new(2, 6, 4, &device);
        // Linear weights are stored as [in_features, out_features]
        assert_eq!(layer.input_weights.weight.dims(), [2, 24]);
        assert_eq!(layer.hidden_weights.weight.dims(), [6, 24]);
    }

    #[test]
    fn test_last_output_matches_final_state() {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        let layer: RecurrentLayer<TestBackend> = RecurrentLayer::new(1, 4, 3, &device);
        let input = Tensor::<TestBackend, 3>::random(
            [1, 6, 1],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );

        let (output, state) = layer.forward(input, None);
        let last = output.narrow(1, 5, 1).reshape([1, 4]);
        let diff: f32 = (last - state.hidden).abs().sum().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_hidden_values_are_bounded() {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        let layer: RecurrentLayer<TestBackend> = RecurrentLayer::new(2, 5, 1, &device);
        let input = Tensor::<TestBackend, 3>::ones([3, 4, 2], &device) * 100.0;

        let (output, _) = layer.forward(input, None);
        let max: f32 = output.abs().max().into_scalar();
        assert!(max <= 1.0);
    }
}
