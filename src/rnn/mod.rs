pub mod rnn_model;
pub mod step_1_series_preparation;
pub mod step_2_rnn_cell;
pub mod step_3_rnn_model_arch;
pub mod step_4_train_model;
pub mod step_5_prediction;
pub mod step_6_model_serialization;

pub use rnn_model::{RnnModel, RnnModelSettings};
pub use step_1_series_preparation::TimeSeries;
pub use step_3_rnn_model_arch::{RnnKind, RnnModelConfig, TimeSeriesRnn};
pub use step_4_train_model::RnnTrainerOptions;
