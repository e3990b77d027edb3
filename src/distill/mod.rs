//! Ensemble distillation
//!
//! A distilled model learns to reproduce the predictive distribution of a
//! teacher (usually an [`crate::Ensemble`]) with a single network. The
//! teacher is only ever borrowed and queried for plain arrays, so no gradient
//! can flow back into it.
//!
//! ## Example
//!
//! ```no_run
//! use destilar::distill::{DistilledModel, LogitsDistribution, LogitsDistributionConfig};
//! use destilar::Ensemble;
//! # let ensemble: Ensemble = Ensemble::new(3);
//! # let batches = vec![];
//!
//! let config = LogitsDistributionConfig::new([4, 32, 6]);
//! let mut student = LogitsDistribution::new(&ensemble, config)?;
//! student.train(&batches, 20, None)?;
//! # let inputs = ndarray::Array2::zeros((1, 4));
//! let samples = student.predict(&inputs, None)?; // batch x 50 x 3
//! # Ok::<(), destilar::Error>(())
//! ```

mod logits;
mod loss;


pub use logits::{
    center_logits, implicit_class_transform, GaussianParams, LogitsDistribution,
    LogitsDistributionConfig,
};
pub use loss::{GaussianLoss, GaussianNll, LossGrad};

use crate::error::Result;
use crate::train::{ProgressCallback, TrainConfig, TrainResult, Trainable, Trainer};
use crate::Batch;
use ndarray::{Array2, Array3};

/// Read-only source of teacher outputs
///
/// Anything that can produce per-member logits and probabilities can teach.
pub trait TeacherModel {
    /// Probabilities, `batch x members x classes`
    fn predict(&self, inputs: &Array2<f32>) -> Result<Array3<f32>>;

    /// Logits, `batch x members x classes`
    fn get_logits(&self, inputs: &Array2<f32>) -> Result<Array3<f32>>;

    fn num_classes(&self) -> usize;
}

/// A single model trained to mimic a teacher's predictive distribution
pub trait DistilledModel: Trainable {
    /// Distribution parameters produced by [`DistilledModel::forward`]
    type Output;

    fn forward(&self, inputs: &Array2<f32>) -> Result<Self::Output>;

    /// Scalar loss of `outputs` against teacher predictions, optionally
    /// blended with a hard-label term
    fn calculate_loss(
        &self,
        outputs: &Self::Output,
        teacher_predictions: &Array3<f32>,
        labels: Option<&[usize]>,
    ) -> Result<f32>;

    /// Teacher targets for `inputs` in the space the model is trained in
    fn generate_teacher_predictions(&self, inputs: &Array2<f32>) -> Result<Array3<f32>>;

    /// Monte-Carlo samples mapped onto class probabilities,
    /// `batch x num_samples x classes`
    fn predict(&mut self, inputs: &Array2<f32>, num_samples: Option<usize>) -> Result<Array3<f32>>;

    /// Monte-Carlo samples in logit space
    fn predict_logits(
        &mut self,
        inputs: &Array2<f32>,
        num_samples: Option<usize>,
    ) -> Result<Array3<f32>>;

    fn train_config(&self) -> &TrainConfig;

    /// Train against the teacher for `num_epochs` passes
    fn train(
        &mut self,
        train_batches: &[Batch],
        num_epochs: usize,
        valid_batches: Option<&[Batch]>,
    ) -> Result<TrainResult>
    where
        Self: Sized,
    {
        let config = self.train_config().clone();
        let mut trainer = Trainer::new(config.clone());
        trainer.add_callback(ProgressCallback::new(config.log_interval));
        trainer.train(self, train_batches, num_epochs, valid_batches)
    }
}
