//! Gaussian distribution over teacher logits
//!
//! The network maps an input to `2K` numbers. The first `K` are the mean of a
//! diagonal Gaussian over the teacher's logit vector; the last `K` pass
//! through a softplus and a lower bound to give its variance. Training
//! maximizes the likelihood of every ensemble member's logits; prediction
//! draws reparameterized samples from the fitted Gaussian.

use super::loss::{GaussianLoss, GaussianNll};
use super::{DistilledModel, TeacherModel};
use crate::autograd::{backward, Context, Device, Tensor};
use crate::error::{Error, Result};
use crate::nn::Mlp;
use crate::optim::{Adam, Optimizer};
use crate::train::{Batch, TrainConfig, Trainable};
use ndarray::{s, Array1, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hyperparameters of a [`LogitsDistribution`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogitsDistributionConfig {
    /// Input width, hidden widths, `2K`
    pub layer_sizes: Vec<usize>,

    pub learning_rate: f32,

    /// Added to the softplus output so the variance never reaches zero
    pub variance_lower_bound: f32,

    /// Sample count used when a predict call passes `None`
    pub default_num_samples: usize,

    /// Subtract the last class's logit from every teacher logit and drop
    /// the last column
    pub scale_teacher_logits: bool,

    /// Add a cross-entropy term on the predictive mean when labels are known
    pub use_hard_labels: bool,

    /// Seed for weight initialization and sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    pub device: Device,

    pub training: TrainConfig,
}

impl Default for LogitsDistributionConfig {
    fn default() -> Self {
        Self {
            layer_sizes: Vec::new(),
            learning_rate: 0.001,
            variance_lower_bound: 0.001,
            default_num_samples: 50,
            scale_teacher_logits: false,
            use_hard_labels: false,
            seed: None,
            device: Device::Cpu,
            training: TrainConfig::default(),
        }
    }
}

impl LogitsDistributionConfig {
    pub fn new(layer_sizes: impl Into<Vec<usize>>) -> Self {
        Self {
            layer_sizes: layer_sizes.into(),
            ..Self::default()
        }
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_variance_lower_bound(mut self, bound: f32) -> Self {
        self.variance_lower_bound = bound;
        self
    }

    pub fn with_default_num_samples(mut self, num_samples: usize) -> Self {
        self.default_num_samples = num_samples;
        self
    }

    pub fn with_scaled_teacher_logits(mut self, scale: bool) -> Self {
        self.scale_teacher_logits = scale;
        self
    }

    pub fn with_hard_labels(mut self, use_hard_labels: bool) -> Self {
        self.use_hard_labels = use_hard_labels;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_training(mut self, training: TrainConfig) -> Self {
        self.training = training;
        self
    }
}

/// Mean and variance of a diagonal Gaussian per example, both `batch x K`
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianParams {
    pub mean: Array2<f32>,
    pub variance: Array2<f32>,
}

impl GaussianParams {
    pub fn batch_size(&self) -> usize {
        self.mean.nrows()
    }

    /// Width of the logit space
    pub fn dim(&self) -> usize {
        self.mean.ncols()
    }
}

fn softplus(z: f32) -> f32 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

fn sigmoid(z: f32) -> f32 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Subtract each member's last logit from all of its logits
///
/// The last class column of the result is zero.
pub fn center_logits(logits: &Array3<f32>) -> Array3<f32> {
    let classes = logits.shape()[2];
    if classes == 0 {
        return logits.clone();
    }
    let last = logits.slice(s![.., .., classes - 1..classes]).to_owned();
    logits - &last
}

/// Map logit samples onto probabilities with an implicit extra class at 0
///
/// `p_k = exp(s_k) / (Σ_j exp(s_j) + 1)`, applied along the last axis. The
/// result sums to less than one; the remainder is the implicit class.
pub fn implicit_class_transform(samples: &Array3<f32>) -> Array3<f32> {
    let mut out = samples.clone();
    for mut lane in out.lanes_mut(Axis(2)) {
        let max = lane.iter().fold(0.0f32, |a, &b| a.max(b));
        lane.mapv_inplace(|v| (v - max).exp());
        let denom = lane.sum() + (-max).exp();
        lane /= denom;
    }
    out
}

/// Distilled model predicting a Gaussian over the teacher's logits
///
/// The teacher is borrowed for the model's lifetime and never modified.
pub struct LogitsDistribution<'t, T: TeacherModel + ?Sized, L: GaussianLoss = GaussianNll> {
    teacher: &'t T,
    loss: L,
    network: Mlp,
    optimizer: Adam,
    context: Context,
    rng: StdRng,
    config: LogitsDistributionConfig,
}

impl<T: TeacherModel + ?Sized, L: GaussianLoss> std::fmt::Debug for LogitsDistribution<'_, T, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogitsDistribution")
            .field("layer_sizes", &self.network.layer_sizes())
            .field("loss", &self.loss.name())
            .field("teacher_classes", &self.teacher.num_classes())
            .field("device", &self.context.device())
            .finish()
    }
}

impl<'t, T: TeacherModel + ?Sized> LogitsDistribution<'t, T> {
    /// Build a student trained with the Gaussian negative log-likelihood
    pub fn new(teacher: &'t T, config: LogitsDistributionConfig) -> Result<Self> {
        Self::with_loss(teacher, config, GaussianNll)
    }
}

impl<'t, T: TeacherModel + ?Sized, L: GaussianLoss> LogitsDistribution<'t, T, L> {
    /// Build a student with a custom likelihood loss
    ///
    /// Fails if the final layer width is odd, or if half of it differs from
    /// the teacher's class count (minus one when teacher logits are centered).
    pub fn with_loss(teacher: &'t T, config: LogitsDistributionConfig, loss: L) -> Result<Self> {
        let out_width = config.layer_sizes.last().copied().unwrap_or(0);
        if out_width == 0 || out_width % 2 != 0 {
            return Err(Error::ConfigError(format!(
                "Final layer width must be even and positive, got {out_width}"
            )));
        }

        let classes = teacher.num_classes();
        let expected = if config.scale_teacher_logits {
            if classes < 2 {
                return Err(Error::ConfigError(
                    "Centering teacher logits needs at least two classes".to_string(),
                ));
            }
            classes - 1
        } else {
            classes
        };
        if out_width / 2 != expected {
            return Err(Error::ConfigError(format!(
                "Final layer width {out_width} gives {} outputs but the teacher provides {expected}",
                out_width / 2
            )));
        }

        let bound = config.variance_lower_bound;
        if !bound.is_finite() || bound < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "Variance lower bound must be finite and non-negative, got {bound}"
            )));
        }
        if config.default_num_samples == 0 {
            return Err(Error::InvalidParameter(
                "Default sample count must be positive".to_string(),
            ));
        }
        if !(config.learning_rate > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "Learning rate must be positive, got {}",
                config.learning_rate
            )));
        }
        if bound > 0.0 {
            warn!(variance_lower_bound = bound, "non-zero variance lower bound set");
        }

        let network = Mlp::new(&config.layer_sizes, config.seed)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            teacher,
            loss,
            network,
            optimizer: Adam::default_params(config.learning_rate),
            context: Context::on(config.device),
            rng,
            config,
        })
    }

    pub fn teacher(&self) -> &'t T {
        self.teacher
    }

    pub fn config(&self) -> &LogitsDistributionConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn network(&self) -> &Mlp {
        &self.network
    }

    /// Width `K` of the modelled logit space
    pub fn num_outputs(&self) -> usize {
        self.network.output_size() / 2
    }

    /// Restart the sampling generator from `seed`
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Batch average of the predicted mean, one value per logit
    pub fn mean_expected_value(&self, outputs: &GaussianParams) -> Array1<f32> {
        outputs
            .mean
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(outputs.dim()))
    }

    /// Batch average of the predicted variance, one value per logit
    pub fn mean_variance(&self, outputs: &GaussianParams) -> Array1<f32> {
        outputs
            .variance
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(outputs.dim()))
    }

    fn check_batch(inputs: &Array2<f32>) -> Result<()> {
        if inputs.nrows() == 0 {
            return Err(Error::InvalidParameter("Empty batch".to_string()));
        }
        Ok(())
    }

    /// Split raw network output into mean and floored softplus variance
    fn split(&self, raw: &Array2<f32>) -> GaussianParams {
        let k = self.num_outputs();
        let bound = self.config.variance_lower_bound;
        GaussianParams {
            mean: raw.slice(s![.., ..k]).to_owned(),
            variance: raw.slice(s![.., k..]).mapv(|z| softplus(z) + bound),
        }
    }

    /// Cross entropy of the labels under softmax([mean, 0])
    ///
    /// Returns the loss and its gradient w.r.t. the mean. Label `K` names the
    /// implicit class and is only valid when teacher logits are centered.
    fn hard_label_loss(&self, mean: &Array2<f32>, labels: &[usize]) -> Result<(f32, Array2<f32>)> {
        let (batch, k) = mean.dim();
        if labels.len() != batch {
            return Err(Error::ShapeMismatch {
                expected: vec![batch],
                got: vec![labels.len()],
            });
        }

        let num_classes = if self.config.scale_teacher_logits { k + 1 } else { k };
        let mut grad = Array2::zeros((batch, k));
        let mut total = 0.0f32;
        for (b, &y) in labels.iter().enumerate() {
            if y >= num_classes {
                return Err(Error::InvalidParameter(format!(
                    "Label {y} out of range for {num_classes} classes"
                )));
            }
            let row = mean.row(b);
            let max = row.iter().fold(0.0f32, |a, &v| a.max(v));
            let exp: Array1<f32> = row.mapv(|v| (v - max).exp());
            let implicit = (-max).exp();
            let denom = exp.sum() + implicit;

            let numerator = if y == k { implicit } else { exp[y] };
            let p_label = numerator / denom;
            total -= (p_label + 1e-10).ln();

            for j in 0..k {
                let onehot = if j == y { 1.0 } else { 0.0 };
                grad[[b, j]] = (exp[j] / denom - onehot) / batch as f32;
            }
        }

        Ok((total / batch as f32, grad))
    }

    fn draw(&mut self, inputs: &Array2<f32>, num_samples: Option<usize>) -> Result<Array3<f32>> {
        Self::check_batch(inputs)?;
        let num_samples = num_samples.unwrap_or(self.config.default_num_samples);
        if num_samples == 0 {
            return Err(Error::InvalidParameter(
                "Sample count must be positive".to_string(),
            ));
        }

        self.context.eval();
        let params = self.forward(inputs)?;
        if let Some(v) = params.variance.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(Error::Sampling(format!("Invalid variance {v}")));
        }
        if params.mean.iter().any(|m| !m.is_finite()) {
            return Err(Error::Sampling("Non-finite mean".to_string()));
        }

        let (batch, k) = params.mean.dim();
        let std = params.variance.mapv(f32::sqrt);
        let mut samples = Array3::zeros((batch, num_samples, k));
        for b in 0..batch {
            for n in 0..num_samples {
                for j in 0..k {
                    let eps: f32 = self.rng.sample(StandardNormal);
                    samples[[b, n, j]] = params.mean[[b, j]] + std[[b, j]] * eps;
                }
            }
        }
        Ok(samples)
    }
}

impl<T: TeacherModel + ?Sized, L: GaussianLoss> Trainable for LogitsDistribution<'_, T, L> {
    fn parameters_mut(&mut self) -> &mut [Tensor] {
        self.network.params_mut()
    }

    fn compute_gradients(&mut self, batch: &Batch) -> Result<f32> {
        Self::check_batch(batch.inputs())?;
        self.context.train();

        let rows = batch.inputs().nrows();
        let k = self.num_outputs();
        let mut raw = self.network.forward_tensor(batch.inputs())?;
        let raw_values = raw.to_array2(rows, 2 * k);
        let params = self.split(&raw_values);

        let teacher = self.generate_teacher_predictions(batch.inputs())?;
        let lg = self.loss.loss_and_grad(&params, &teacher)?;
        let mut loss = lg.loss;
        let mut d_mean = lg.d_mean;
        if self.config.use_hard_labels {
            let (ce, d_ce) = self.hard_label_loss(&params.mean, batch.labels())?;
            loss += ce;
            d_mean += &d_ce;
        }

        // Chain through softplus: ∂var/∂z = sigmoid(z)
        let d_z = &lg.d_variance * &raw_values.slice(s![.., k..]).mapv(sigmoid);
        let mut grad = Array2::zeros((rows, 2 * k));
        grad.slice_mut(s![.., ..k]).assign(&d_mean);
        grad.slice_mut(s![.., k..]).assign(&d_z);

        backward(&mut raw, Some(Array1::from_iter(grad.iter().copied())));
        Ok(loss)
    }

    fn apply_gradients(&mut self) {
        self.optimizer.step(self.network.params_mut());
    }

    fn validation_loss(&self, batch: &Batch) -> Result<f32> {
        let outputs = self.forward(batch.inputs())?;
        let teacher = self.generate_teacher_predictions(batch.inputs())?;
        self.calculate_loss(&outputs, &teacher, Some(batch.labels()))
    }

    fn learning_rate(&self) -> f32 {
        self.optimizer.lr()
    }
}

impl<T: TeacherModel + ?Sized, L: GaussianLoss> DistilledModel for LogitsDistribution<'_, T, L> {
    type Output = GaussianParams;

    fn forward(&self, inputs: &Array2<f32>) -> Result<GaussianParams> {
        Self::check_batch(inputs)?;
        let raw = self.network.forward(inputs)?;
        Ok(self.split(&raw))
    }

    fn calculate_loss(
        &self,
        outputs: &GaussianParams,
        teacher_predictions: &Array3<f32>,
        labels: Option<&[usize]>,
    ) -> Result<f32> {
        let mut loss = self.loss.loss_and_grad(outputs, teacher_predictions)?.loss;
        if let (true, Some(labels)) = (self.config.use_hard_labels, labels) {
            loss += self.hard_label_loss(&outputs.mean, labels)?.0;
        }
        Ok(loss)
    }

    fn generate_teacher_predictions(&self, inputs: &Array2<f32>) -> Result<Array3<f32>> {
        let logits = self.teacher.get_logits(inputs)?;
        let classes = logits.shape()[2];
        if classes != self.teacher.num_classes() {
            return Err(Error::ShapeMismatch {
                expected: vec![inputs.nrows(), logits.shape()[1], self.teacher.num_classes()],
                got: logits.shape().to_vec(),
            });
        }

        if self.config.scale_teacher_logits {
            Ok(center_logits(&logits)
                .slice(s![.., .., ..classes - 1])
                .to_owned())
        } else {
            Ok(logits)
        }
    }

    fn predict(&mut self, inputs: &Array2<f32>, num_samples: Option<usize>) -> Result<Array3<f32>> {
        Ok(implicit_class_transform(&self.draw(inputs, num_samples)?))
    }

    fn predict_logits(
        &mut self,
        inputs: &Array2<f32>,
        num_samples: Option<usize>,
    ) -> Result<Array3<f32>> {
        self.draw(inputs, num_samples)
    }

    fn train_config(&self) -> &TrainConfig {
        &self.config.training
    }
}
