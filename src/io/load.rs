//! Model loading functionality

use super::format::ModelFormat;
use super::model::{Model, ModelMetadata, ModelState, Parameter};
use super::save::{METADATA_KEY, ORDER_KEY};
use crate::{Error, Result, Tensor};
use std::path::Path;

/// Load a model from a file, detecting the format from its extension
pub fn load_model(path: impl AsRef<Path>) -> Result<Model> {
    let path = path.as_ref();

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Serialization(format!("{} has no extension", path.display())))?;
    let format = ModelFormat::from_extension(ext)
        .ok_or_else(|| Error::Serialization(format!("Unsupported file extension: {ext}")))?;

    let state: ModelState = match format {
        ModelFormat::SafeTensors => return load_safetensors(path),
        ModelFormat::Json => serde_json::from_str(&std::fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?,
        ModelFormat::Yaml => serde_yaml::from_str(&std::fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}")))?,
    };

    Model::from_state(state)
}

fn load_safetensors(path: &Path) -> Result<Model> {
    let data = std::fs::read(path)?;

    let (_, header) = safetensors::SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;
    let extra = header.metadata().clone().unwrap_or_default();

    let metadata: ModelMetadata = extra
        .get(METADATA_KEY)
        .map(|raw| serde_json::from_str::<ModelMetadata>(raw))
        .transpose()
        .map_err(|e| Error::Serialization(format!("Invalid model metadata: {e}")))?
        .unwrap_or_else(|| ModelMetadata::new("unknown", "unknown"));

    let tensors = safetensors::SafeTensors::deserialize(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    // The container sorts tensors internally; restore the saved order when known
    let order: Vec<String> = match extra.get(ORDER_KEY) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::Serialization(format!("Invalid parameter order: {e}")))?,
        None => {
            let mut names: Vec<String> = tensors.names().into_iter().cloned().collect();
            names.sort();
            names
        }
    };

    let mut parameters = Vec::with_capacity(order.len());
    for name in order {
        let view = tensors
            .tensor(&name)
            .map_err(|e| Error::Serialization(format!("Tensor '{name}': {e}")))?;
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let shape = view.shape().to_vec();
        parameters.push(Parameter::new(name, shape, Tensor::from_vec(values, true))?);
    }

    Ok(Model::new(metadata, parameters))
}
