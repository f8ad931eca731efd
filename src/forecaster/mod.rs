pub mod params;
pub mod predictor_model;
pub mod schema;

pub use params::ForecasterParams;
pub use predictor_model::{
    evaluate_predictor_model, load_predictor_model, predict_with_model, save_predictor_model,
    train_predictor_model, ForecastBackend, Forecaster, ForecasterState,
};
pub use schema::ForecastingSchema;
