use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::step_3_rnn_model_arch::{RnnModelConfig, TimeSeriesRnn};

/// Sidecar written next to the weights so the artifact can be rebuilt alone
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelMetadata {
    pub version: String,
    pub timestamp: u64,
    pub config: RnnModelConfig,
}

impl ModelMetadata {
    pub fn new(config: RnnModelConfig) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            config,
        }
    }
}

/// Path of the metadata sidecar for a weights file, e.g. `model.bin` -> `model.config.json`
pub fn metadata_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension("config.json")
}

/// Save the weights and their architecture config
pub fn save_model_with_metadata<B: Backend>(
    model: &TimeSeriesRnn<B>,
    config: &RnnModelConfig,
    path: impl AsRef<Path>,
) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)
            .context("Failed to create model parent directory")?;
    }
    let model_path = path.as_ref().with_extension("bin");
    model
        .clone()
        .save_file::<BinFileRecorder<FullPrecisionSettings>, _>(&model_path, &Default::default())
        .context("Failed to save model")?;

    let metadata_json = serde_json::to_string_pretty(&ModelMetadata::new(config.clone()))
        .context("Failed to serialize model metadata")?;
    std::fs::write(metadata_path(&path), metadata_json)
        .context("Failed to write model metadata file")?;
    Ok(())
}

/// Load weights saved by `save_model_with_metadata`
pub fn load_model_with_metadata<B: Backend>(
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(TimeSeriesRnn<B>, ModelMetadata)> {
    let metadata_json = std::fs::read_to_string(metadata_path(&path))
        .context("Failed to read model metadata file")?;
    let metadata: ModelMetadata = serde_json::from_str(&metadata_json)
        .context("Failed to parse model metadata")?;

    let model_path = path.as_ref().with_extension("bin");
    let model = metadata
        .config
        .init::<B>(device)
        .load_file::<BinFileRecorder<FullPrecisionSettings>, _>(
            &model_path,
            &Default::default(),
            device,
        )
        .context("Failed to load model")?;
    Ok((model, metadata))
}

/// Check that both files of a saved model exist and the metadata parses
pub fn verify_model(path: impl AsRef<Path>) -> Result<bool> {
    let model_path = path.as_ref().with_extension("bin");
    let metadata_path = metadata_path(&path);
    if !model_path.exists() || !metadata_path.exists() {
        return Ok(false);
    }

    let metadata_json = std::fs::read_to_string(&metadata_path)
        .context("Failed to read model metadata file")?;
    let _: ModelMetadata = serde_json::from_str(&metadata_json)
        .context("Failed to parse model metadata")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::test_data::backend_rng_guard;
    use crate::rnn::step_3_rnn_model_arch::RnnKind;
    use burn::tensor::Tensor;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::tempdir;

    #[test]
    fn test_model_serialization_with_metadata() -> Result<()> {
        let _guard = backend_rng_guard();
        let temp_dir = tempdir()?;
        let model_path = temp_dir.path().join("model.bin");
        let device = NdArrayDevice::Cpu;
        let config = RnnModelConfig::new(RnnKind::Lstm, 2, 10, 2, 0.1);
        let model: TimeSeriesRnn<NdArray> = config.init(&device);

        save_model_with_metadata(&model, &config, &model_path)?;
        assert!(model_path.exists());
        assert!(temp_dir.path().join("model.config.json").exists());
        assert!(verify_model(&model_path)?);

        let (loaded, metadata): (TimeSeriesRnn<NdArray>, ModelMetadata) =
            load_model_with_metadata(&model_path, &device)?;
        assert_eq!(metadata.config, config);

        // Same weights, same outputs
        let input = Tensor::<NdArray, 3>::ones([1, 4, 2], &device);
        let diff: f32 = (model.forward(input.clone()) - loaded.forward(input))
            .abs()
            .max()
            .into_scalar();
        assert!(diff < 1e-7);

        temp_dir.close()?;
        Ok(())
    }

    #[test]
    fn test_verify_missing_model() -> Result<()> {
        let temp_dir = tempdir()?;
        assert!(!verify_model(temp_dir.path().join("model.bin"))?);
        Ok(())
    }
}
