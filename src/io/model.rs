//! In-memory model representation used for persistence

use crate::error::{Error, Result};
use crate::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Descriptive information stored alongside model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name/identifier
    pub name: String,

    /// Architecture tag checked on load (e.g. "mlp-classifier")
    pub architecture: String,

    pub version: String,

    /// Architecture hyperparameters needed to rebuild the model
    #[serde(default)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            custom: HashMap::new(),
        }
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }

    /// Deserialize a custom field into `T`
    pub fn custom_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .custom
            .get(key)
            .ok_or_else(|| Error::Serialization(format!("Missing metadata field '{key}'")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| Error::Serialization(format!("Invalid metadata field '{key}': {e}")))
    }
}

/// Shape and dtype of a stored parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

/// A named parameter with its logical shape
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub shape: Vec<usize>,
    pub tensor: Tensor,
}

impl Parameter {
    /// Create a parameter, checking that `shape` covers the tensor exactly
    pub fn new(name: impl Into<String>, shape: Vec<usize>, tensor: Tensor) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != tensor.len() {
            return Err(Error::ShapeMismatch {
                expected: shape,
                got: vec![tensor.len()],
            });
        }
        Ok(Self {
            name: name.into(),
            shape,
            tensor,
        })
    }

    pub fn info(&self) -> ParameterInfo {
        ParameterInfo {
            name: self.name.clone(),
            shape: self.shape.clone(),
            dtype: "f32".to_string(),
        }
    }
}

/// Serializable form of a [`Model`] for the text formats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub metadata: ModelMetadata,
    pub parameters: Vec<ParameterInfo>,
    /// All parameter values, concatenated in `parameters` order
    pub data: Vec<f32>,
}

/// Model metadata plus its ordered parameters
#[derive(Debug, Clone)]
pub struct Model {
    pub metadata: ModelMetadata,
    pub parameters: Vec<Parameter>,
}

impl Model {
    pub fn new(metadata: ModelMetadata, parameters: Vec<Parameter>) -> Self {
        Self {
            metadata,
            parameters,
        }
    }

    pub fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Like [`Model::get_parameter`] but reports a missing name as an error
    pub fn require_parameter(&self, name: &str) -> Result<&Parameter> {
        self.get_parameter(name)
            .ok_or_else(|| Error::Serialization(format!("Missing parameter '{name}'")))
    }

    pub fn to_state(&self) -> ModelState {
        let mut data = Vec::with_capacity(self.parameters.iter().map(|p| p.tensor.len()).sum());
        let parameters = self
            .parameters
            .iter()
            .map(|p| {
                data.extend(p.tensor.data().iter().copied());
                p.info()
            })
            .collect();

        ModelState {
            metadata: self.metadata.clone(),
            parameters,
            data,
        }
    }

    /// Rebuild a model from its serialized state
    ///
    /// Fails when the data buffer does not match the declared shapes.
    pub fn from_state(state: ModelState) -> Result<Self> {
        let expected: usize = state
            .parameters
            .iter()
            .map(|p| p.shape.iter().product::<usize>())
            .sum();
        if expected != state.data.len() {
            return Err(Error::Serialization(format!(
                "Parameter data holds {} values but shapes declare {}",
                state.data.len(),
                expected
            )));
        }

        let mut offset = 0;
        let mut parameters = Vec::with_capacity(state.parameters.len());
        for info in state.parameters {
            let size: usize = info.shape.iter().product();
            let tensor = Tensor::from_vec(state.data[offset..offset + size].to_vec(), true);
            offset += size;
            parameters.push(Parameter::new(info.name, info.shape, tensor)?);
        }

        Ok(Self {
            metadata: state.metadata,
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> Model {
        let params = vec![
            Parameter::new("w", vec![2, 2], Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], true))
                .unwrap(),
            Parameter::new("b", vec![2], Tensor::from_vec(vec![0.5, -0.5], true)).unwrap(),
        ];
        Model::new(ModelMetadata::new("lin", "linear"), params)
    }

    #[test]
    fn test_parameter_rejects_wrong_shape() {
        let result = Parameter::new("w", vec![2, 3], Tensor::zeros(5, true));
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_custom_field_lookup() {
        let meta = ModelMetadata::new("m", "mlp").with_custom("layer_sizes", serde_json::json!([4, 8, 3]));
        let sizes: Vec<usize> = meta.custom_as("layer_sizes").unwrap();
        assert_eq!(sizes, vec![4, 8, 3]);
        assert!(meta.custom_as::<Vec<usize>>("missing").is_err());
    }

    #[test]
    fn test_state_keeps_shapes_and_order() {
        let model = linear();
        let restored = Model::from_state(model.to_state()).unwrap();

        let names: Vec<_> = restored.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["w", "b"]);
        assert_eq!(restored.require_parameter("w").unwrap().shape, vec![2, 2]);
        assert_eq!(
            restored.require_parameter("b").unwrap().tensor.data().to_vec(),
            vec![0.5, -0.5]
        );
    }

    #[test]
    fn test_truncated_state_is_rejected() {
        let mut state = linear().to_state();
        state.data.pop();
        assert!(Model::from_state(state).is_err());
    }
}
