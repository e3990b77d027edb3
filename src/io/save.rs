//! Model saving functionality

use super::format::{ModelFormat, SaveConfig};
use super::model::Model;
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::path::Path;

/// Safetensors metadata key holding the JSON-encoded [`super::ModelMetadata`]
pub(crate) const METADATA_KEY: &str = "destilar.metadata";
/// Safetensors metadata key holding the parameter order
pub(crate) const ORDER_KEY: &str = "destilar.parameters";

/// Save a model to `path` in the configured format
///
/// # Example
///
/// ```no_run
/// use destilar::io::{save_model, Model, ModelFormat, ModelMetadata, Parameter, SaveConfig};
/// use destilar::Tensor;
///
/// let weight = Parameter::new("weight", vec![1, 2], Tensor::from_vec(vec![1.0, 2.0], true))?;
/// let model = Model::new(ModelMetadata::new("my-model", "linear"), vec![weight]);
///
/// save_model(&model, "model.json", &SaveConfig::new(ModelFormat::Json))?;
/// # Ok::<(), destilar::Error>(())
/// ```
pub fn save_model(model: &Model, path: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
    let path = path.as_ref();

    let data = match config.format {
        ModelFormat::SafeTensors => return save_safetensors(model, path),
        ModelFormat::Json => {
            let state = model.to_state();
            if config.pretty {
                serde_json::to_string_pretty(&state)
            } else {
                serde_json::to_string(&state)
            }
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?
        }
        ModelFormat::Yaml => serde_yaml::to_string(&model.to_state())
            .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?,
    };

    std::fs::write(path, data)?;
    Ok(())
}

fn save_safetensors(model: &Model, path: &Path) -> Result<()> {
    let buffers: Vec<Vec<u8>> = model
        .parameters
        .iter()
        .map(|p| {
            let values: Vec<f32> = p.tensor.data().iter().copied().collect();
            bytemuck::cast_slice(&values).to_vec()
        })
        .collect();

    let mut views = Vec::with_capacity(model.parameters.len());
    for (param, bytes) in model.parameters.iter().zip(&buffers) {
        let view = TensorView::new(Dtype::F32, param.shape.clone(), bytes).map_err(|e| {
            Error::Serialization(format!("Invalid tensor '{}': {e}", param.name))
        })?;
        views.push((param.name.as_str(), view));
    }

    let order: Vec<&str> = model.parameters.iter().map(|p| p.name.as_str()).collect();
    let mut metadata = HashMap::new();
    metadata.insert(
        METADATA_KEY.to_string(),
        serde_json::to_string(&model.metadata)
            .map_err(|e| Error::Serialization(format!("Metadata serialization failed: {e}")))?,
    );
    metadata.insert(
        ORDER_KEY.to_string(),
        serde_json::to_string(&order)
            .map_err(|e| Error::Serialization(format!("Metadata serialization failed: {e}")))?,
    );

    let bytes = safetensors::serialize(views, &Some(metadata))
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))?;
    std::fs::write(path, bytes)?;

    Ok(())
}
