// External imports
use anyhow::{anyhow, Result};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use ndarray::ArrayView1;

// Internal imports
use super::step_1_series_preparation::{step_features, TimeSeries};
use super::step_3_rnn_model_arch::TimeSeriesRnn;
use crate::error::ForecastError;

/// Make a prediction for a single batch of inputs
///
/// # Arguments
///
/// * `model` - Trained network
/// * `input_data` - Input tensor of shape [batch_size, sequence_length, input_size]
///
/// # Returns
///
/// Returns the forecast for the step after the last input, shape [batch_size, 1]
pub fn predict_next_step<B: Backend>(
    model: &TimeSeriesRnn<B>,
    input_data: Tensor<B, 3>,
) -> Tensor<B, 2> {
    let [batch_size, seq_len, _] = input_data.dims();
    model
        .forward(input_data)
        .narrow(1, seq_len - 1, 1)
        .reshape([batch_size, 1])
}

fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Failed to read prediction tensor: {:?}", e))
}

/// Forecast `n` steps ahead for every series
///
/// Each series feeds its last `input_chunk_length` steps through the network,
/// then the forecast is rolled forward one step at a time: the hidden state is
/// carried over and the previous output, together with the next future
/// covariate values, becomes the next input. Outputs are clamped to [0, 1],
/// the range of the scaled targets.
///
/// # Arguments
///
/// * `model` - Trained network
/// * `n` - Forecast horizon
/// * `input_chunk_length` - Number of trailing steps fed before rolling forward
/// * `series` - Scaled target series
/// * `future_covariates` - Covariates covering at least `len + n` steps per series
/// * `device` - Device to place tensors on
///
/// # Returns
///
/// Returns `n` scaled forecasts per series, in the order of `series`
pub fn forecast<B: Backend>(
    model: &TimeSeriesRnn<B>,
    n: usize,
    input_chunk_length: usize,
    series: &[TimeSeries],
    future_covariates: Option<&[TimeSeries]>,
    device: &B::Device,
) -> Result<Vec<Vec<f64>>> {
    if input_chunk_length == 0 {
        return Err(ForecastError::InvalidHyperparameter(
            "input_chunk_length must be at least 1".to_string(),
        )
        .into());
    }
    if let Some(covs) = future_covariates {
        if covs.len() != series.len() {
            return Err(ForecastError::LengthMismatch {
                expected: series.len(),
                actual: covs.len(),
            }
            .into());
        }
    }
    if n == 0 || series.is_empty() {
        return Ok(vec![Vec::new(); series.len()]);
    }

    let input_size = model.input_size();
    let batch_size = series.len();

    // Trailing input chunk of every series, stacked into one batch
    let mut chunk = Vec::with_capacity(batch_size * input_chunk_length * input_size);
    for (index, target) in series.iter().enumerate() {
        if target.len() < input_chunk_length {
            return Err(ForecastError::InsufficientData {
                what: format!("series {}", index),
                required: input_chunk_length,
                actual: target.len(),
            }
            .into());
        }
        if let Some(covs) = future_covariates {
            let required = target.len() + n;
            if covs[index].len() < required {
                return Err(ForecastError::InsufficientData {
                    what: format!("future covariates of series {}", index),
                    required,
                    actual: covs[index].len(),
                }
                .into());
            }
        }

        let start = target.len() - input_chunk_length;
        for t in start..target.len() {
            let covariates = covariate_row(future_covariates, index, t + 1);
            chunk.extend(step_features(target.row(t)[0], covariates));
        }
    }
    let inputs = Tensor::<B, 3>::from_data(
        TensorData::new(chunk, [batch_size, input_chunk_length, input_size]),
        device,
    );

    let (outputs, mut states) = model.forward_with_state(inputs, None);
    let mut current = outputs
        .narrow(1, input_chunk_length - 1, 1)
        .reshape([batch_size, 1])
        .clamp(0.0, 1.0);

    let mut forecasts = vec![Vec::with_capacity(n); batch_size];
    for step in 0..n {
        let values = tensor_to_vec(current.clone())?;
        for (forecast, value) in forecasts.iter_mut().zip(values.iter()) {
            forecast.push(*value as f64);
        }
        if step + 1 == n {
            break;
        }

        // Feed the forecast back with the covariates of the step after it
        let mut next = Vec::with_capacity(batch_size * input_size);
        for (index, target) in series.iter().enumerate() {
            let t = target.len() + step;
            let covariates = covariate_row(future_covariates, index, t + 1);
            next.extend(step_features(values[index] as f64, covariates));
        }
        let next = Tensor::<B, 3>::from_data(
            TensorData::new(next, [batch_size, 1, input_size]),
            device,
        );

        let (output, next_states) = model.forward_with_state(next, Some(states));
        states = next_states;
        current = output.reshape([batch_size, 1]).clamp(0.0, 1.0);
    }

    Ok(forecasts)
}

fn covariate_row(
    future_covariates: Option<&[TimeSeries]>,
    index: usize,
    t: usize,
) -> Option<ArrayView1<'_, f64>> {
    future_covariates.map(|covs| covs[index].row(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::test_data::backend_rng_guard;
    use crate::rnn::step_3_rnn_model_arch::{RnnKind, RnnModelConfig};
    use burn_ndarray::{NdArray, NdArrayDevice};
    use ndarray::Array2;

    type TestBackend = NdArray<f32>;

    fn ramp(len: usize) -> TimeSeries {
        TimeSeries::univariate("y", (0..len).map(|t| t as f64 / len as f64).collect())
    }

    #[test]
    fn test_forecast_shape_and_range() -> Result<()> {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        let model: TimeSeriesRnn<TestBackend> =
            RnnModelConfig::new(RnnKind::Gru, 1, 8, 2, 0.0).init(&device);
        let series = vec![ramp(20), ramp(12), ramp(15)];

        let forecasts = forecast(&model, 4, 6, &series, None, &device)?;

        assert_eq!(forecasts.len(), 3);
        for forecast in &forecasts {
            assert_eq!(forecast.len(), 4);
            assert!(forecast.iter().all(|v| (0.0..=1.0).contains(v)));
        }
        Ok(())
    }

    #[test]
    fn test_first_step_matches_single_prediction() -> Result<()> {
        let _guard = backend_rng_guard();
        let device = NdArrayDevice::default();
        let model: TimeSeriesRnn<TestBackend> =
            RnnModelConfig::new(RnnKind::Rnn, 1, 5, 1, 0.0).init(&device);
        let series = vec![ramp(10)];

        let forecasts = forecast(&model, 2, 4, &series, None, &device)?;

        let chunk: Vec<f32> = series[0].first_component()[6..]
            .iter()
            .map(|v| *v as f32)
            .collect();
        let input = Tensor::<TestBackend, 3>::from_data(TensorData::new(chunk, [1, 4, 1]), &device);
        let single = predict_next_step(&model, input).clamp(0.0, 1.0);
        let expected = tensor_to_vec(single)?[0] as f64;

        assert!((forecasts[0][0] - expected).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_forecast_with_covariates() -> Result<()> {
        let device = NdArrayDevice::default();
        let model: TimeSeriesRnn<TestBackend> =
            RnnModelConfig::new(RnnKind::Lstm, 3, 6, 1, 0.0).init(&device);
        let series = vec![ramp(10), ramp(10)];
        let covs: Vec<TimeSeries> = (0..2)
            .map(|_| {
                TimeSeries::new(
                    vec!["a".to_string(), "b".to_string()],
                    Array2::from_elem((13, 2), 0.5),
                )
                .unwrap()
            })
            .collect();

        let forecasts = forecast(&model, 3, 5, &series, Some(&covs), &device)?;
        assert_eq!(forecasts.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3]);
        Ok(())
    }

    #[test]
    fn test_short_covariates_are_rejected() {
        let device = NdArrayDevice::default();
        let model: TimeSeriesRnn<TestBackend> =
            RnnModelConfig::new(RnnKind::Lstm, 2, 6, 1, 0.0).init(&device);
        let series = vec![ramp(10)];
        let covs = vec![TimeSeries::univariate("c", vec![0.0; 11])];

        let err = forecast(&model, 3, 5, &series, Some(&covs), &device).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ForecastError>(),
            Some(ForecastError::InsufficientData { required: 13, actual: 11, .. })
        ));
    }

    #[test]
    fn test_series_shorter_than_input_chunk_is_rejected() {
        let device = NdArrayDevice::default();
        let model: TimeSeriesRnn<TestBackend> =
            RnnModelConfig::new(RnnKind::Rnn, 1, 4, 1, 0.0).init(&device);
        let series = vec![ramp(3)];

        assert!(forecast(&model, 2, 5, &series, None, &device).is_err());
    }
}
