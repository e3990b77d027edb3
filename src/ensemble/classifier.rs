//! Feed-forward classifier used as the default ensemble member

use super::member::Member;
use crate::autograd::backward;
use crate::config::{build_optimizer, OptimSpec};
use crate::error::{Error, Result};
use crate::io::{Model, ModelMetadata, Parameter};
use crate::nn::Mlp;
use crate::optim::Optimizer;
use crate::train::{Batch, CrossEntropyLoss, Trainable};
use crate::Tensor;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub(crate) const ARCHITECTURE: &str = "mlp-classifier";

/// Hyperparameters of an [`MlpClassifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Input width, hidden widths, number of classes
    pub layer_sizes: Vec<usize>,

    #[serde(default)]
    pub optimizer: OptimSpec,

    /// Seed for weight initialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ClassifierConfig {
    pub fn new(layer_sizes: impl Into<Vec<usize>>) -> Self {
        Self {
            layer_sizes: layer_sizes.into(),
            optimizer: OptimSpec::default(),
            seed: None,
        }
    }

    pub fn with_optimizer(mut self, optimizer: OptimSpec) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.optimizer.lr = lr;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// ReLU MLP trained with cross entropy
///
/// # Example
///
/// ```
/// use destilar::ensemble::{ClassifierConfig, Member, MlpClassifier};
///
/// let member = MlpClassifier::new(ClassifierConfig::new([4, 16, 3]).with_seed(0))?;
/// assert_eq!(member.output_size(), 3);
/// # Ok::<(), destilar::Error>(())
/// ```
pub struct MlpClassifier {
    mlp: Mlp,
    optimizer: Box<dyn Optimizer>,
    config: ClassifierConfig,
}

impl MlpClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let mlp = Mlp::new(&config.layer_sizes, config.seed)?;
        Self::with_network(mlp, config)
    }

    fn with_network(mlp: Mlp, config: ClassifierConfig) -> Result<Self> {
        let optimizer = build_optimizer(&config.optimizer)?;
        Ok(Self {
            mlp,
            optimizer,
            config,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn network(&self) -> &Mlp {
        &self.mlp
    }
}

impl std::fmt::Debug for MlpClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlpClassifier")
            .field("layer_sizes", &self.config.layer_sizes)
            .field("optimizer", &self.optimizer.name())
            .finish()
    }
}

impl Trainable for MlpClassifier {
    fn parameters_mut(&mut self) -> &mut [Tensor] {
        self.mlp.params_mut()
    }

    fn compute_gradients(&mut self, batch: &Batch) -> Result<f32> {
        let logits = self.mlp.forward_tensor(batch.inputs())?;
        let mut loss = CrossEntropyLoss.forward(&logits, batch.labels(), self.output_size())?;
        let value = loss.data()[0];
        backward(&mut loss, None);
        Ok(value)
    }

    fn apply_gradients(&mut self) {
        self.optimizer.step(self.mlp.params_mut());
    }

    fn validation_loss(&self, batch: &Batch) -> Result<f32> {
        let logits = Tensor::from_array2(&self.mlp.forward(batch.inputs())?, false);
        let loss = CrossEntropyLoss.forward(&logits, batch.labels(), self.output_size())?;
        Ok(loss.data()[0])
    }

    fn learning_rate(&self) -> f32 {
        self.optimizer.lr()
    }
}

impl Member for MlpClassifier {
    fn input_size(&self) -> usize {
        self.mlp.input_size()
    }

    fn output_size(&self) -> usize {
        self.mlp.output_size()
    }

    fn logits(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        self.mlp.forward(inputs)
    }

    fn to_model(&self) -> Model {
        let sizes = self.mlp.layer_sizes();
        let parameters = self
            .mlp
            .params()
            .chunks(2)
            .enumerate()
            .flat_map(|(layer, pair)| {
                let (fan_in, fan_out) = (sizes[layer], sizes[layer + 1]);
                [
                    Parameter {
                        name: format!("layers.{layer}.weight"),
                        shape: vec![fan_in, fan_out],
                        tensor: pair[0].detach(),
                    },
                    Parameter {
                        name: format!("layers.{layer}.bias"),
                        shape: vec![fan_out],
                        tensor: pair[1].detach(),
                    },
                ]
            })
            .collect();

        let metadata = ModelMetadata::new("ensemble-member", ARCHITECTURE)
            .with_custom("layer_sizes", serde_json::json!(sizes))
            .with_custom("optimizer", serde_json::json!(self.config.optimizer));

        Model::new(metadata, parameters)
    }

    fn from_model(model: &Model) -> Result<Self> {
        if model.metadata.architecture != ARCHITECTURE {
            return Err(Error::Serialization(format!(
                "Expected a {ARCHITECTURE} model, found '{}'",
                model.metadata.architecture
            )));
        }
        let layer_sizes: Vec<usize> = model.metadata.custom_as("layer_sizes")?;
        let optimizer: OptimSpec = model
            .metadata
            .custom_as("optimizer")
            .unwrap_or_default();

        let mut params = Vec::with_capacity(2 * layer_sizes.len().saturating_sub(1));
        for (layer, pair) in layer_sizes.windows(2).enumerate() {
            let weight = model.require_parameter(&format!("layers.{layer}.weight"))?;
            if weight.shape != [pair[0], pair[1]] {
                return Err(Error::ShapeMismatch {
                    expected: pair.to_vec(),
                    got: weight.shape.clone(),
                });
            }
            let bias = model.require_parameter(&format!("layers.{layer}.bias"))?;
            params.push(Tensor::new(weight.tensor.data().clone(), true));
            params.push(Tensor::new(bias.tensor.data().clone(), true));
        }

        let mlp = Mlp::from_params(&layer_sizes, params)?;
        let config = ClassifierConfig {
            layer_sizes,
            optimizer,
            seed: None,
        };
        Self::with_network(mlp, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::{TrainConfig, Trainer};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn xor_like() -> Vec<Batch> {
        vec![Batch::new(
            array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.1], [0.1, 1.0]],
            vec![0, 1, 0, 1],
        )
        .unwrap()]
    }

    #[test]
    fn test_predict_rows_are_distributions() {
        let member = MlpClassifier::new(ClassifierConfig::new([2, 4, 3]).with_seed(1)).unwrap();
        let probs = member.predict(&array![[0.3, -0.2], [1.0, 2.0]]).unwrap();
        assert_eq!(probs.dim(), (2, 3));
        for row in probs.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_training_fits_separable_data() {
        let mut member = MlpClassifier::new(
            ClassifierConfig::new([2, 8, 2])
                .with_seed(3)
                .with_learning_rate(0.05),
        )
        .unwrap();
        let data = xor_like();

        let before = member.validation_loss(&data[0]).unwrap();
        Trainer::new(TrainConfig::default())
            .train(&mut member, &data, 100, None)
            .unwrap();
        let after = member.validation_loss(&data[0]).unwrap();

        assert!(after < before);
        assert!(after < 0.3, "loss after training: {after}");
    }

    #[test]
    fn test_model_round_trip_preserves_logits() {
        let member = MlpClassifier::new(ClassifierConfig::new([3, 5, 2]).with_seed(9)).unwrap();
        let restored = MlpClassifier::from_model(&member.to_model()).unwrap();

        let x = array![[0.1, 0.2, 0.3], [-1.0, 0.5, 2.0]];
        assert_eq!(member.logits(&x).unwrap(), restored.logits(&x).unwrap());
        assert_eq!(restored.config().optimizer, member.config().optimizer);
    }

    #[test]
    fn test_from_model_rejects_other_architectures() {
        let mut model = MlpClassifier::new(ClassifierConfig::new([2, 2]).with_seed(0))
            .unwrap()
            .to_model();
        model.metadata.architecture = "gaussian-logits".to_string();
        assert!(MlpClassifier::from_model(&model).is_err());
    }

    #[test]
    fn test_from_model_checks_weight_shape() {
        let mut model = MlpClassifier::new(ClassifierConfig::new([2, 3]).with_seed(0))
            .unwrap()
            .to_model();
        model.parameters[0].shape = vec![3, 2];
        assert!(matches!(
            MlpClassifier::from_model(&model),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
