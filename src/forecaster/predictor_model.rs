// External crates
use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use log::{info, warn};
use ndarray::{concatenate, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

// Local modules
use super::params::ForecasterParams;
use super::schema::ForecastingSchema;
use crate::built_info;
use crate::constants::{MODEL_FILE_NAME, MODEL_NAME, PREDICTOR_FILE_NAME};
use crate::error::ForecastError;
use crate::rnn::{RnnModel, TimeSeries};
use crate::util::device::AcceleratorProbe;
use crate::util::scaler::MinMaxScaler;

/// Backends the forecaster can train on
pub trait ForecastBackend: AutodiffBackend + AcceleratorProbe {}

impl<B: AutodiffBackend + AcceleratorProbe> ForecastBackend for B {}

/// Adapter state persisted next to the network weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecasterState {
    pub version: String,
    pub saved_at: Option<String>,
    pub data_schema: ForecastingSchema,
    pub params: ForecasterParams,
    pub use_past_covariates: bool,
    pub use_future_covariates: bool,
    pub history_length: Option<usize>,
    pub is_trained: bool,
    /// Series identifiers in canonical (first-seen) order
    pub all_ids: Vec<String>,
    /// Target scaler of series `i`, index-aligned with `all_ids`
    pub scalers: Vec<MinMaxScaler>,
    pub target_series: Vec<TimeSeries>,
    pub past_covariates: Option<Vec<TimeSeries>>,
    pub future_covariates: Option<Vec<TimeSeries>>,
}

/// Series shaped for the RNN layer
struct PreparedData {
    ids: Vec<String>,
    scalers: Vec<MinMaxScaler>,
    targets: Vec<TimeSeries>,
    past: Option<Vec<TimeSeries>>,
    future: Option<Vec<TimeSeries>>,
}

/// Split `df` per identifier, keeping the order in which identifiers first appear
///
/// Each group is sorted by `time_col` with a stable sort, so rows already in
/// chronological order keep their order.
pub fn group_by_id(
    df: &DataFrame,
    id_col: &str,
    time_col: &str,
) -> Result<Vec<(String, DataFrame)>> {
    let ids = df.column(id_col)?.cast(&DataType::String)?;
    let ids = ids.str()?;
    if ids.null_count() > 0 {
        return Err(ForecastError::NullValues {
            column: id_col.to_string(),
            count: ids.null_count(),
        }
        .into());
    }

    let mut order: Vec<String> = Vec::new();
    let mut rows: HashMap<String, Vec<IdxSize>> = HashMap::new();
    for (row, id) in ids.into_iter().enumerate() {
        let id = id.unwrap_or_default();
        rows.entry(id.to_string())
            .or_insert_with(|| {
                order.push(id.to_string());
                Vec::new()
            })
            .push(row as IdxSize);
    }

    let mut groups = Vec::with_capacity(order.len());
    for id in order {
        let indices = rows.remove(&id).unwrap_or_default();
        let group = df
            .take(&IdxCa::from_vec("idx".into(), indices))?
            .sort(
                vec![time_col],
                SortMultipleOptions::default().with_maintain_order(true),
            )?;
        groups.push((id, group));
    }
    Ok(groups)
}

/// Copy `columns` of `df` into a `[rows, columns]` matrix
fn columns_to_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let mut matrix = Array2::zeros((df.height(), columns.len()));
    for (j, name) in columns.iter().enumerate() {
        let column = df.column(name)?.cast(&DataType::Float64)?;
        let values = column.f64()?;
        if values.null_count() > 0 {
            return Err(ForecastError::NullValues {
                column: name.clone(),
                count: values.null_count(),
            }
            .into());
        }
        for (i, value) in values.into_iter().enumerate() {
            matrix[[i, j]] = value.unwrap_or(f64::NAN);
        }
    }
    Ok(matrix)
}

/// Recency window in effect; a length of 0 means no window
fn effective_history_length(history_length: Option<usize>) -> Option<usize> {
    history_length.filter(|&length| length > 0)
}

/// Keep the last `history_length` rows when a window is configured
fn recent(df: &DataFrame, history_length: Option<usize>) -> DataFrame {
    match effective_history_length(history_length) {
        Some(length) => df.tail(Some(length)),
        None => df.clone(),
    }
}

fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sum / actual.len().max(1) as f64).sqrt()
}

/// RNN forecaster behind a fit / predict / save / load interface
///
/// One network is shared by every series of the training table. Each series
/// gets its own target scaler; scaler `i` always belongs to series `i` of the
/// canonical (first-seen) identifier order.
pub struct Forecaster<B: ForecastBackend> {
    state: ForecasterState,
    model: RnnModel<B>,
}

impl<B: ForecastBackend> Forecaster<B> {
    /// Construct an untrained forecaster
    ///
    /// # Arguments
    ///
    /// * `data_schema` - Column roles of the training data
    /// * `params` - Architecture and training hyperparameters
    pub fn new(data_schema: ForecastingSchema, params: ForecasterParams) -> Result<Self> {
        let device = B::select_device();
        let model = RnnModel::new(params.rnn_settings()?, device)?;

        let state = ForecasterState {
            version: built_info::PKG_VERSION.to_string(),
            saved_at: None,
            use_past_covariates: data_schema.has_past_covariates(),
            use_future_covariates: data_schema.has_future_covariates(),
            history_length: effective_history_length(params.history_length),
            data_schema,
            params,
            is_trained: false,
            all_ids: Vec::new(),
            scalers: Vec::new(),
            target_series: Vec::new(),
            past_covariates: None,
            future_covariates: None,
        };
        Ok(Self { state, model })
    }

    pub fn is_trained(&self) -> bool {
        self.state.is_trained
    }

    pub fn data_schema(&self) -> &ForecastingSchema {
        &self.state.data_schema
    }

    pub fn params(&self) -> &ForecasterParams {
        &self.state.params
    }

    /// Recency window configured through the hyperparameters
    pub fn history_length(&self) -> Option<usize> {
        self.state.history_length
    }

    pub fn all_ids(&self) -> &[String] {
        &self.state.all_ids
    }

    pub fn scalers(&self) -> &[MinMaxScaler] {
        &self.state.scalers
    }

    pub fn target_series(&self) -> &[TimeSeries] {
        &self.state.target_series
    }

    pub fn past_covariates(&self) -> Option<&[TimeSeries]> {
        self.state.past_covariates.as_deref()
    }

    pub fn future_covariates(&self) -> Option<&[TimeSeries]> {
        self.state.future_covariates.as_deref()
    }

    pub fn uses_past_covariates(&self) -> bool {
        self.state.use_past_covariates
    }

    pub fn uses_future_covariates(&self) -> bool {
        self.state.use_future_covariates
    }

    /// Per-step input width of the trained network, `None` before `fit`
    pub fn network_input_size(&self) -> Option<usize> {
        self.model.config().map(|config| config.input_size)
    }

    fn prepare_data(
        &self,
        history: &DataFrame,
        data_schema: &ForecastingSchema,
        history_length: Option<usize>,
        test_dataframe: Option<&DataFrame>,
    ) -> Result<PreparedData> {
        let test_dataframe = if data_schema.has_future_covariates() {
            Some(test_dataframe.ok_or(ForecastError::MissingFutureCovariates)?)
        } else {
            None
        };

        let extra: Vec<String> = data_schema
            .past_covariates
            .iter()
            .chain(data_schema.future_covariates.iter())
            .cloned()
            .collect();
        data_schema.validate_columns(history, &extra, "history")?;
        if let Some(test) = test_dataframe {
            if test.column(&data_schema.id_col).is_err() {
                return Err(ForecastError::ColumnNotFound {
                    column: data_schema.id_col.clone(),
                    table: "test".to_string(),
                }
                .into());
            }
            for column in &data_schema.future_covariates {
                if test.column(column).is_err() {
                    return Err(ForecastError::ColumnNotFound {
                        column: column.clone(),
                        table: "test".to_string(),
                    }
                    .into());
                }
            }
        }

        let groups = group_by_id(history, &data_schema.id_col, &data_schema.time_col)?;

        let mut ids = Vec::with_capacity(groups.len());
        let mut scalers = Vec::with_capacity(groups.len());
        let mut targets = Vec::with_capacity(groups.len());
        let mut past = Vec::new();

        for (id, group) in &groups {
            let series = recent(group, history_length);

            let mut scaler = MinMaxScaler::new();
            let target_values =
                columns_to_matrix(&series, std::slice::from_ref(&data_schema.target))?;
            let scaled = scaler.fit_transform(&target_values)?;
            targets.push(TimeSeries::new(vec![data_schema.target.clone()], scaled)?);
            scalers.push(scaler);
            ids.push(id.clone());

            if data_schema.has_past_covariates() {
                // One scaler over all past covariate columns of the series
                let mut past_scaler = MinMaxScaler::new();
                let values = columns_to_matrix(&series, &data_schema.past_covariates)?;
                let scaled = past_scaler.fit_transform(&values)?;
                past.push(TimeSeries::new(data_schema.past_covariates.clone(), scaled)?);
            }
        }

        let future = match test_dataframe {
            Some(test) => {
                let test_groups: HashMap<String, DataFrame> =
                    group_by_id(test, &data_schema.id_col, &data_schema.time_col)?
                        .into_iter()
                        .collect();

                let mut future = Vec::with_capacity(groups.len());
                for (id, train_group) in &groups {
                    let test_group = test_groups.get(id).ok_or_else(|| {
                        ForecastError::MissingSeries {
                            id: id.clone(),
                            table: "test".to_string(),
                        }
                    })?;

                    let train_values = columns_to_matrix(
                        &recent(train_group, history_length),
                        &data_schema.future_covariates,
                    )?;
                    let test_values = columns_to_matrix(
                        &recent(test_group, history_length),
                        &data_schema.future_covariates,
                    )?;
                    let combined =
                        concatenate(Axis(0), &[train_values.view(), test_values.view()])?;

                    let mut future_scaler = MinMaxScaler::new();
                    let scaled = future_scaler.fit_transform(&combined)?;
                    future.push(TimeSeries::new(data_schema.future_covariates.clone(), scaled)?);
                }
                Some(future)
            }
            None => None,
        };

        Ok(PreparedData {
            ids,
            scalers,
            targets,
            past: if past.is_empty() { None } else { Some(past) },
            future,
        })
    }

    /// Fit the forecaster to the training data
    ///
    /// A single network is trained across all series contained in `history`.
    ///
    /// # Arguments
    ///
    /// * `history` - Training table, one row per observation
    /// * `data_schema` - Column roles of the training table
    /// * `history_length` - Keep only the most recent rows of every series
    /// * `test_dataframe` - Test table; required when the schema declares future covariates
    pub fn fit(
        &mut self,
        history: &DataFrame,
        data_schema: &ForecastingSchema,
        history_length: Option<usize>,
        test_dataframe: Option<&DataFrame>,
    ) -> Result<()> {
        let history_length = effective_history_length(history_length);
        let seed = self.state.params.random_state.unwrap_or_else(rand::random);
        B::seed(seed);
        let mut rng = StdRng::seed_from_u64(seed);

        let prepared =
            self.prepare_data(history, data_schema, history_length, test_dataframe)?;
        info!(
            "Prepared {} series (history_length = {:?}, past covariates = {}, \
             future covariates = {})",
            prepared.targets.len(),
            history_length,
            prepared.past.is_some(),
            prepared.future.is_some()
        );
        if prepared.past.is_some() {
            warn!("Past covariates are prepared but not used for training");
        }

        // Past covariates stay out of training
        self.model
            .fit(&prepared.targets, prepared.future.as_deref(), &mut rng)?;

        self.state.is_trained = true;
        self.state.data_schema = data_schema.clone();
        self.state.use_past_covariates = data_schema.has_past_covariates();
        self.state.use_future_covariates = data_schema.has_future_covariates();
        self.state.history_length = history_length;
        self.state.all_ids = prepared.ids;
        self.state.scalers = prepared.scalers;
        self.state.target_series = prepared.targets;
        self.state.past_covariates = prepared.past;
        self.state.future_covariates = prepared.future;
        Ok(())
    }

    /// De-scaled forecasts of every series, concatenated in canonical order
    fn forecast_values(&self) -> Result<Vec<f64>> {
        if !self.state.is_trained {
            return Err(ForecastError::NotFitted.into());
        }

        let horizon = self.state.data_schema.forecast_length;
        let predictions = self.model.predict(
            horizon,
            &self.state.target_series,
            self.state.future_covariates.as_deref(),
        )?;

        let mut values = Vec::with_capacity(predictions.len() * horizon);
        for (index, prediction) in predictions.into_iter().enumerate() {
            let scaler = &self.state.scalers[index];
            let len = prediction.len();
            let scaled = Array2::from_shape_vec((len, 1), prediction)?;
            values.extend(scaler.inverse_transform(&scaled)?.column(0).iter().copied());
        }
        Ok(values)
    }

    /// Make the forecast of `schema.forecast_length` steps for every series
    ///
    /// # Arguments
    ///
    /// * `test_data` - Rows to receive the forecast, ordered series by series
    ///   in canonical order, `forecast_length` rows per series
    /// * `prediction_col_name` - Name of the appended column
    ///
    /// # Returns
    ///
    /// Returns `test_data` with the prediction column appended
    pub fn predict(&self, test_data: &DataFrame, prediction_col_name: &str) -> Result<DataFrame> {
        let values = self.forecast_values()?;
        if values.len() != test_data.height() {
            return Err(ForecastError::LengthMismatch {
                expected: values.len(),
                actual: test_data.height(),
            }
            .into());
        }

        let mut output = test_data.clone();
        output.with_column(Series::new(prediction_col_name.into(), values))?;
        Ok(output)
    }

    /// Root mean squared error of the forecast against `y_test`
    pub fn evaluate(&self, x_test: &DataFrame, y_test: &Series) -> Result<f64> {
        let predicted = self.forecast_values()?;
        if predicted.len() != x_test.height() || predicted.len() != y_test.len() {
            return Err(ForecastError::LengthMismatch {
                expected: predicted.len(),
                actual: y_test.len(),
            }
            .into());
        }

        let actual = y_test.cast(&DataType::Float64)?;
        let actual: Vec<f64> = actual
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        Ok(root_mean_squared_error(&actual, &predicted))
    }

    /// Save the forecaster to `model_dir_path`
    ///
    /// Writes the adapter state and the network weights as two files.
    pub fn save<P: AsRef<Path>>(&self, model_dir_path: P) -> Result<()> {
        if !self.state.is_trained {
            return Err(ForecastError::NotFitted.into());
        }
        let dir = model_dir_path.as_ref();

        self.model.save(dir.join(MODEL_FILE_NAME))?;

        let mut state = self.state.clone();
        state.saved_at = Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        let json = serde_json::to_string_pretty(&state)
            .context("Failed to serialize forecaster state")?;
        let predictor_path = dir.join(PREDICTOR_FILE_NAME);
        std::fs::write(&predictor_path, json)
            .with_context(|| format!("Failed to write {}", predictor_path.display()))?;

        info!("Forecaster saved to {}", dir.display());
        Ok(())
    }

    /// Load a forecaster saved with `save`
    pub fn load<P: AsRef<Path>>(model_dir_path: P) -> Result<Self> {
        let dir = model_dir_path.as_ref();
        let predictor_path = dir.join(PREDICTOR_FILE_NAME);
        let json = std::fs::read_to_string(&predictor_path)
            .with_context(|| format!("Failed to read {}", predictor_path.display()))?;
        let state: ForecasterState =
            serde_json::from_str(&json).context("Failed to parse forecaster state")?;

        let device = B::select_device();
        let settings = state.params.rnn_settings()?;
        let model = RnnModel::load(settings, dir.join(MODEL_FILE_NAME), device)?;

        info!(
            "Forecaster loaded from {} ({} series, saved with version {})",
            dir.display(),
            state.all_ids.len(),
            state.version
        );
        Ok(Self { state, model })
    }
}

impl<B: ForecastBackend> fmt::Display for Forecaster<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Model name: {}", MODEL_NAME)
    }
}

/// Instantiate and train the forecaster
///
/// # Arguments
///
/// * `history` - Training table
/// * `data_schema` - Column roles of the training table
/// * `hyperparameters` - JSON object of forecaster hyperparameters
/// * `testing_dataframe` - Test table; required when future covariates are declared
pub fn train_predictor_model<B: ForecastBackend>(
    history: &DataFrame,
    data_schema: &ForecastingSchema,
    hyperparameters: &serde_json::Value,
    testing_dataframe: Option<&DataFrame>,
) -> Result<Forecaster<B>> {
    let params = ForecasterParams::from_json(hyperparameters)?;
    let mut model = Forecaster::<B>::new(data_schema.clone(), params)?;
    let history_length = model.history_length();
    model.fit(history, data_schema, history_length, testing_dataframe)?;
    Ok(model)
}

/// Make the forecast with a trained forecaster
pub fn predict_with_model<B: ForecastBackend>(
    model: &Forecaster<B>,
    test_data: &DataFrame,
    prediction_col_name: &str,
) -> Result<DataFrame> {
    model.predict(test_data, prediction_col_name)
}

/// Save the forecaster, creating the directory if needed
pub fn save_predictor_model<B: ForecastBackend, P: AsRef<Path>>(
    model: &Forecaster<B>,
    predictor_dir_path: P,
) -> Result<()> {
    std::fs::create_dir_all(predictor_dir_path.as_ref())
        .context("Failed to create predictor directory")?;
    model.save(predictor_dir_path)
}

/// Load a forecaster from disk
pub fn load_predictor_model<B: ForecastBackend, P: AsRef<Path>>(
    predictor_dir_path: P,
) -> Result<Forecaster<B>> {
    Forecaster::load(predictor_dir_path)
}

/// Evaluate a forecaster, returning the RMSE of its forecast against `y_test`
pub fn evaluate_predictor_model<B: ForecastBackend>(
    model: &Forecaster<B>,
    x_test: &DataFrame,
    y_test: &Series,
) -> Result<f64> {
    model.evaluate(x_test, y_test)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_id_keeps_first_seen_order() -> Result<()> {
        let df = df!(
            "id" => ["b", "a", "b", "c", "a"],
            "t" => [2i64, 1, 1, 1, 2],
            "y" => [20.0, 1.0, 10.0, 5.0, 2.0],
        )?;

        let groups = group_by_id(&df, "id", "t")?;
        let ids: Vec<&str> = groups.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        // Rows of "b" come back in time order
        let b_values = columns_to_matrix(&groups[0].1, &["y".to_string()])?;
        assert_eq!(b_values.column(0).to_vec(), vec![10.0, 20.0]);
        Ok(())
    }

    #[test]
    fn test_group_by_numeric_id() -> Result<()> {
        let df = df!("id" => [7i64, 3, 7], "t" => [0i64, 0, 1], "y" => [1.0, 2.0, 3.0])?;
        let groups = group_by_id(&df, "id", "t")?;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "7");
        assert_eq!(groups[0].1.height(), 2);
        Ok(())
    }

    #[test]
    fn test_columns_to_matrix_rejects_nulls() -> Result<()> {
        let df = df!("y" => [Some(1.0), None, Some(3.0)])?;
        let err = columns_to_matrix(&df, &["y".to_string()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ForecastError>(),
            Some(ForecastError::NullValues { count: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_recent_keeps_tail() -> Result<()> {
        let df = df!("y" => [1.0, 2.0, 3.0, 4.0])?;
        assert_eq!(recent(&df, Some(2)).height(), 2);
        assert_eq!(recent(&df, Some(10)).height(), 4);
        assert_eq!(recent(&df, None).height(), 4);
        Ok(())
    }

    #[test]
    fn test_zero_history_length_keeps_everything() -> Result<()> {
        let df = df!("y" => [1.0, 2.0, 3.0])?;
        assert_eq!(effective_history_length(Some(0)), None);
        assert_eq!(effective_history_length(Some(5)), Some(5));
        assert_eq!(recent(&df, Some(0)).height(), 3);
        Ok(())
    }

    #[test]
    fn test_rmse() {
        let rmse = root_mean_squared_error(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]);
        assert!((rmse - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
