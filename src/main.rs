// External crates
use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

// Local modules
use rnn_forecaster::constants::PREDICTION_COLUMN;
use rnn_forecaster::forecaster::{
    load_predictor_model, predict_with_model, save_predictor_model, train_predictor_model,
    ForecastingSchema,
};
use rnn_forecaster::util::file_utils::{read_csv_file, write_csv_file};
use rnn_forecaster::DefaultBackend;

const USAGE: &str = concat!(
    "Usage: rnn-forecaster <schema.json> <train.csv> <test.csv> ",
    "<hyperparameters.json> <model_dir> [predictions.csv]"
);

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 6 {
        bail!("{}", USAGE);
    }
    let schema_path = PathBuf::from(&args[1]);
    let train_path = PathBuf::from(&args[2]);
    let test_path = PathBuf::from(&args[3]);
    let hyperparameters_path = PathBuf::from(&args[4]);
    let model_dir = PathBuf::from(&args[5]);
    let output_path = args
        .get(6)
        .map(PathBuf::from)
        .unwrap_or_else(|| model_dir.join("predictions.csv"));

    let data_schema = ForecastingSchema::from_json_file(&schema_path)?;
    let hyperparameters: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&hyperparameters_path)
            .with_context(|| format!("Failed to read {}", hyperparameters_path.display()))?,
    )
    .context("Failed to parse hyperparameters")?;

    let train_df = read_csv_file(&train_path)?;
    let test_df = read_csv_file(&test_path)?;
    println!("Training dataset size: {} rows", train_df.height());
    println!("Testing dataset size: {} rows", test_df.height());

    // Train and persist
    println!("Starting model training...");
    let model = train_predictor_model::<DefaultBackend>(
        &train_df,
        &data_schema,
        &hyperparameters,
        Some(&test_df),
    )?;
    println!("{}", model);
    save_predictor_model(&model, &model_dir)?;
    println!("Model saved at: {}", model_dir.display());

    // Reload and forecast
    let model = load_predictor_model::<DefaultBackend, _>(&model_dir)?;
    let mut predictions = predict_with_model(&model, &test_df, PREDICTION_COLUMN)?;
    write_csv_file(&mut predictions, &output_path)?;
    println!(
        "Predictions for {} series ({} steps each) written to {}",
        model.all_ids().len(),
        data_schema.forecast_length,
        output_path.display()
    );

    Ok(())
}
