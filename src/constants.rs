// Model identity
pub const MODEL_NAME: &str = "RNN Forecaster";

// Persisted artifact names, co-located in the model directory
pub const PREDICTOR_FILE_NAME: &str = "predictor.json";
pub const MODEL_FILE_NAME: &str = "model.bin";

// Architecture defaults
pub const DEFAULT_HIDDEN_DIM: usize = 25;
pub const DEFAULT_N_RNN_LAYERS: usize = 1;
pub const DEFAULT_DROPOUT: f64 = 0.0;
pub const DEFAULT_TRAINING_LENGTH: usize = 24;
pub const DEFAULT_RANDOM_STATE: u64 = 0;

// Trainer defaults
pub const DEFAULT_N_EPOCHS: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

// Default name of the appended forecast column used by the binary
pub const PREDICTION_COLUMN: &str = "prediction";
