//! Ensembles of independently trained classifiers
//!
//! Members are trained one after another on the same batches and never share
//! gradients. Predictions are stacked along a member axis, giving a
//! `batch x members x classes` array that doubles as a predictive
//! distribution for [`crate::metrics`] and as teacher output for
//! [`crate::distill`].

mod classifier;
mod member;
mod persist;


pub use classifier::{ClassifierConfig, MlpClassifier};
pub use member::Member;
pub use persist::EnsembleManifest;

use crate::distill::TeacherModel;
use crate::error::{Error, Result};
use crate::metrics::{accuracy, Metric};
use crate::train::{Batch, ProgressCallback, TrainConfig, TrainResult, Trainer};
use ndarray::{s, Array2, Array3};
use tracing::{error, info};

/// Outcome of training one member
#[derive(Debug)]
pub struct MemberOutcome {
    pub index: usize,
    pub result: Result<TrainResult>,
    /// Registered metric values measured right after training
    pub metrics: Vec<(String, f32)>,
}

/// Per-member results of [`Ensemble::train`], in member order
#[derive(Debug, Default)]
pub struct EnsembleTrainReport {
    pub members: Vec<MemberOutcome>,
}

impl EnsembleTrainReport {
    pub fn all_succeeded(&self) -> bool {
        self.members.iter().all(|m| m.result.is_ok())
    }

    /// Indices of members whose training loop failed
    pub fn failed(&self) -> Vec<usize> {
        self.members
            .iter()
            .filter(|m| m.result.is_err())
            .map(|m| m.index)
            .collect()
    }
}

/// Ordered collection of members sharing an output dimensionality
///
/// # Example
///
/// ```
/// use destilar::ensemble::{ClassifierConfig, Ensemble, MlpClassifier};
/// use destilar::metrics::Metric;
///
/// let mut ensemble = Ensemble::new(3);
/// for seed in 0..4 {
///     let config = ClassifierConfig::new([5, 16, 3]).with_seed(seed);
///     ensemble.add_member(MlpClassifier::new(config)?)?;
/// }
/// ensemble.add_metrics([Metric::accuracy()]);
/// assert_eq!(ensemble.len(), 4);
/// # Ok::<(), destilar::Error>(())
/// ```
pub struct Ensemble<M: Member = MlpClassifier> {
    members: Vec<M>,
    metrics: Vec<Metric>,
    output_size: usize,
    train_config: TrainConfig,
}

impl<M: Member> Ensemble<M> {
    /// Create an empty ensemble over `output_size` classes
    pub fn new(output_size: usize) -> Self {
        Self {
            members: Vec::new(),
            metrics: Vec::new(),
            output_size,
            train_config: TrainConfig::default(),
        }
    }

    pub fn with_train_config(mut self, config: TrainConfig) -> Self {
        self.train_config = config;
        self
    }

    /// Append a member
    ///
    /// Fails if its output size differs from the ensemble's, or if its input
    /// size differs from the members already present.
    pub fn add_member(&mut self, member: M) -> Result<()> {
        if member.output_size() != self.output_size {
            return Err(Error::ConfigError(format!(
                "Member output size {} does not match ensemble output size {}",
                member.output_size(),
                self.output_size
            )));
        }
        if let Some(first) = self.members.first() {
            if member.input_size() != first.input_size() {
                return Err(Error::ConfigError(format!(
                    "Member input size {} does not match ensemble input size {}",
                    member.input_size(),
                    first.input_size()
                )));
            }
        }
        self.members.push(member);
        Ok(())
    }

    /// Register metrics reported after each member's training
    pub fn add_metrics(&mut self, metrics: impl IntoIterator<Item = Metric>) {
        self.metrics.extend(metrics);
    }

    pub fn members(&self) -> &[M] {
        &self.members
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn train_config(&self) -> &TrainConfig {
        &self.train_config
    }

    /// Train every member for `num_epochs` passes over `train_batches`
    ///
    /// Members train sequentially. A member whose loop fails is logged and
    /// recorded in the report; the remaining members still train. Metrics
    /// are measured on the validation batches, or on the training batches
    /// when none are given.
    pub fn train(
        &mut self,
        train_batches: &[Batch],
        num_epochs: usize,
        valid_batches: Option<&[Batch]>,
    ) -> EnsembleTrainReport {
        let total = self.members.len();
        let eval_batches = valid_batches.unwrap_or(train_batches);
        let mut report = EnsembleTrainReport::default();

        for (index, member) in self.members.iter_mut().enumerate() {
            info!(member = index + 1, total, "training ensemble member");

            let mut trainer = Trainer::new(self.train_config.clone());
            trainer.add_callback(ProgressCallback::new(self.train_config.log_interval));
            let result = trainer.train(member, train_batches, num_epochs, valid_batches);

            let mut metrics = Vec::new();
            match &result {
                Ok(summary) => {
                    info!(
                        member = index + 1,
                        epochs = summary.final_epoch,
                        loss = summary.final_loss,
                        val_loss = ?summary.final_val_loss,
                        "ensemble member trained"
                    );
                    for metric in &self.metrics {
                        match evaluate_metric(metric, eval_batches, |x| {
                            Ok(member.predict(x)?.insert_axis(ndarray::Axis(1)))
                        }) {
                            Ok(Some(value)) => {
                                info!(member = index + 1, metric = %metric.name, value, "member metric");
                                metrics.push((metric.name.clone(), value));
                            }
                            Ok(None) => {}
                            Err(e) => {
                                error!(member = index + 1, metric = %metric.name, error = %e, "metric evaluation failed")
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(member = index + 1, error = %e, "ensemble member training failed");
                }
            }

            report.members.push(MemberOutcome {
                index,
                result,
                metrics,
            });
        }

        if !self.metrics.is_empty() && !eval_batches.is_empty() {
            match self.evaluate(eval_batches) {
                Ok(values) => {
                    for (name, value) in values {
                        info!(metric = %name, value, "ensemble metric");
                    }
                }
                Err(e) => error!(error = %e, "ensemble evaluation failed"),
            }
        }

        report
    }

    fn stack<F>(&self, inputs: &Array2<f32>, per_member: F) -> Result<Array3<f32>>
    where
        F: Fn(&M, &Array2<f32>) -> Result<Array2<f32>>,
    {
        if self.members.is_empty() {
            return Err(Error::ConfigError("Ensemble has no members".to_string()));
        }

        let mut out = Array3::zeros((inputs.nrows(), self.members.len(), self.output_size));
        for (m, member) in self.members.iter().enumerate() {
            out.slice_mut(s![.., m, ..]).assign(&per_member(member, inputs)?);
        }
        Ok(out)
    }

    /// Per-member class probabilities, `batch x members x classes`
    pub fn predict(&self, inputs: &Array2<f32>) -> Result<Array3<f32>> {
        self.stack(inputs, |member, x| member.predict(x))
    }

    /// Per-member logits, `batch x members x classes`
    pub fn get_logits(&self, inputs: &Array2<f32>) -> Result<Array3<f32>> {
        self.stack(inputs, |member, x| member.logits(x))
    }

    /// Mean of per-batch accuracies of the member-averaged prediction
    pub fn accuracy(&self, batches: &[Batch]) -> Result<f32> {
        if batches.is_empty() {
            return Err(Error::InvalidParameter(
                "Accuracy needs at least one batch".to_string(),
            ));
        }
        let mut total = 0.0;
        for batch in batches {
            total += accuracy(batch.labels(), &self.predict(batch.inputs())?);
        }
        Ok(total / batches.len() as f32)
    }

    /// Registered metrics averaged over `batches`
    pub fn evaluate(&self, batches: &[Batch]) -> Result<Vec<(String, f32)>> {
        let mut values = Vec::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            if let Some(value) = evaluate_metric(metric, batches, |x| self.predict(x))? {
                values.push((metric.name.clone(), value));
            }
        }
        Ok(values)
    }
}

/// Mean of `metric` over `batches`, `None` when there are no batches
fn evaluate_metric<F>(metric: &Metric, batches: &[Batch], predict: F) -> Result<Option<f32>>
where
    F: Fn(&Array2<f32>) -> Result<Array3<f32>>,
{
    if batches.is_empty() {
        return Ok(None);
    }
    let mut total = 0.0;
    for batch in batches {
        total += metric.evaluate(batch.labels(), &predict(batch.inputs())?);
    }
    Ok(Some(total / batches.len() as f32))
}

impl<M: Member> TeacherModel for Ensemble<M> {
    fn predict(&self, inputs: &Array2<f32>) -> Result<Array3<f32>> {
        Ensemble::predict(self, inputs)
    }

    fn get_logits(&self, inputs: &Array2<f32>) -> Result<Array3<f32>> {
        Ensemble::get_logits(self, inputs)
    }

    fn num_classes(&self) -> usize {
        self.output_size
    }
}
