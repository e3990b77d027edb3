//! Multi-layer perceptron
//!
//! Fully-connected layers with ReLU on every layer but the last. Weights are
//! stored row-major as `in x out` matrices, so a batch `x` (batch x in) maps
//! to `x @ W + b`.

use crate::autograd::{add_bias, matmul, relu};
use crate::error::{Error, Result};
use crate::Tensor;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone)]
pub struct Mlp {
    layer_sizes: Vec<usize>,
    /// `[w0, b0, w1, b1, ...]`
    params: Vec<Tensor>,
}

impl Mlp {
    /// Create a network with Xavier-initialized weights and zero biases
    ///
    /// A `seed` makes initialization reproducible; without one the generator
    /// is seeded from the OS.
    pub fn new(layer_sizes: &[usize], seed: Option<u64>) -> Result<Self> {
        Self::validate_sizes(layer_sizes)?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let params = Self::init_params(layer_sizes, &mut rng)?;

        Ok(Self {
            layer_sizes: layer_sizes.to_vec(),
            params,
        })
    }

    /// Rebuild a network from existing parameters in `[w0, b0, w1, b1, ...]`
    /// order
    pub fn from_params(layer_sizes: &[usize], params: Vec<Tensor>) -> Result<Self> {
        Self::validate_sizes(layer_sizes)?;
        let expected = 2 * (layer_sizes.len() - 1);
        if params.len() != expected {
            return Err(Error::ShapeMismatch {
                expected: vec![expected],
                got: vec![params.len()],
            });
        }
        for (layer, pair) in params.chunks(2).enumerate() {
            let (fan_in, fan_out) = (layer_sizes[layer], layer_sizes[layer + 1]);
            if pair[0].len() != fan_in * fan_out {
                return Err(Error::ShapeMismatch {
                    expected: vec![fan_in, fan_out],
                    got: vec![pair[0].len()],
                });
            }
            if pair[1].len() != fan_out {
                return Err(Error::ShapeMismatch {
                    expected: vec![fan_out],
                    got: vec![pair[1].len()],
                });
            }
        }

        Ok(Self {
            layer_sizes: layer_sizes.to_vec(),
            params,
        })
    }

    fn validate_sizes(layer_sizes: &[usize]) -> Result<()> {
        if layer_sizes.len() < 2 {
            return Err(Error::ConfigError(format!(
                "An MLP needs at least an input and an output size, got {:?}",
                layer_sizes
            )));
        }
        if layer_sizes.contains(&0) {
            return Err(Error::ConfigError(format!(
                "Layer sizes must be positive, got {:?}",
                layer_sizes
            )));
        }
        Ok(())
    }

    fn init_params<R: Rng>(layer_sizes: &[usize], rng: &mut R) -> Result<Vec<Tensor>> {
        let mut params = Vec::with_capacity(2 * (layer_sizes.len() - 1));

        for pair in layer_sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            // Xavier normal
            let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
            let normal = Normal::new(0.0, std)
                .map_err(|e| Error::InvalidParameter(format!("Xavier std {std}: {e}")))?;

            let weights: Vec<f32> = (0..fan_in * fan_out).map(|_| normal.sample(rng)).collect();
            params.push(Tensor::from_vec(weights, true));
            params.push(Tensor::zeros(fan_out, true));
        }

        Ok(params)
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn input_size(&self) -> usize {
        self.layer_sizes[0]
    }

    pub fn output_size(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    pub fn params(&self) -> &[Tensor] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn check_input(&self, inputs: &Array2<f32>) -> Result<()> {
        if inputs.ncols() != self.input_size() {
            return Err(Error::ShapeMismatch {
                expected: vec![inputs.nrows(), self.input_size()],
                got: inputs.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Forward pass recorded on the tape
    ///
    /// Returns the flattened `batch x output_size` activations; calling
    /// [`crate::backward`] on it fills the parameter gradients.
    pub fn forward_tensor(&self, inputs: &Array2<f32>) -> Result<Tensor> {
        self.check_input(inputs)?;
        let rows = inputs.nrows();
        let num_layers = self.layer_sizes.len() - 1;

        let mut x = Tensor::from_array2(inputs, false);
        for (layer, pair) in self.params.chunks(2).enumerate() {
            let (fan_in, fan_out) = (self.layer_sizes[layer], self.layer_sizes[layer + 1]);
            let z = add_bias(&matmul(&x, &pair[0], rows, fan_in, fan_out), &pair[1], rows, fan_out);
            x = if layer + 1 < num_layers { relu(&z) } else { z };
        }

        Ok(x)
    }

    /// Forward pass without gradient tracking
    pub fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_input(inputs)?;
        let num_layers = self.layer_sizes.len() - 1;

        let mut x = inputs.clone();
        for (layer, pair) in self.params.chunks(2).enumerate() {
            let (fan_in, fan_out) = (self.layer_sizes[layer], self.layer_sizes[layer + 1]);
            let w = pair[0].to_array2(fan_in, fan_out);
            let b: &Array1<f32> = pair[1].data();
            let z = x.dot(&w) + b;
            x = if layer + 1 < num_layers {
                z.mapv(|v| v.max(0.0))
            } else {
                z
            };
        }

        Ok(x)
    }
}
