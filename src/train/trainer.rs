//! Epoch-driven training loop shared by ensemble members and distilled models

use super::callback::{CallbackAction, CallbackContext, CallbackManager, TrainerCallback};
use super::{Batch, MetricsTracker, TrainConfig};
use crate::error::{Error, Result};
use crate::optim::clip_grad_norm;
use crate::Tensor;
use std::time::Instant;
use tracing::debug;

/// A model the [`Trainer`] can drive
///
/// The trainer clears gradients before each step, asks the model to fill them,
/// optionally clips them and then lets the model apply its optimizer.
pub trait Trainable {
    /// Learnable parameters, in a stable order
    fn parameters_mut(&mut self) -> &mut [Tensor];

    /// Forward and backward pass on one batch, returning the batch loss
    fn compute_gradients(&mut self, batch: &Batch) -> Result<f32>;

    /// Update the parameters from their current gradients
    fn apply_gradients(&mut self);

    /// Loss on a batch without touching gradients
    fn validation_loss(&self, batch: &Batch) -> Result<f32>;

    fn learning_rate(&self) -> f32;
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Number of completed epochs
    pub final_epoch: usize,
    pub final_loss: f32,
    pub best_loss: f32,
    pub final_val_loss: Option<f32>,
    pub stopped_early: bool,
    pub elapsed_secs: f64,
}

/// Runs epochs over a batch slice with callbacks and loss tracking
///
/// # Example
///
/// ```no_run
/// use destilar::train::{EarlyStopping, TrainConfig, Trainer};
///
/// let mut trainer = Trainer::new(TrainConfig::default());
/// trainer.add_callback(EarlyStopping::new(5, 0.001).monitor_validation());
/// // let result = trainer.train(&mut model, &train_batches, 100, Some(&valid_batches))?;
/// ```
pub struct Trainer {
    config: TrainConfig,

    /// History of the most recent run
    pub metrics: MetricsTracker,

    callbacks: CallbackManager,

    best_loss: Option<f32>,

    start_time: Option<Instant>,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        Self {
            config,
            metrics: MetricsTracker::new(),
            callbacks: CallbackManager::new(),
            best_loss: None,
            start_time: None,
        }
    }

    pub fn add_callback<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.add(callback);
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &CallbackManager {
        &self.callbacks
    }

    #[allow(clippy::too_many_arguments)]
    fn build_context(
        &self,
        epoch: usize,
        max_epochs: usize,
        step: usize,
        steps_per_epoch: usize,
        loss: f32,
        lr: f32,
        val_loss: Option<f32>,
    ) -> CallbackContext {
        CallbackContext {
            epoch,
            max_epochs,
            step,
            steps_per_epoch,
            global_step: self.metrics.steps,
            loss,
            lr,
            best_loss: self.best_loss,
            val_loss,
            elapsed_secs: self.elapsed_secs(),
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// One optimization step: clear, fill, clip and apply gradients
    pub fn train_step<M: Trainable + ?Sized>(&mut self, model: &mut M, batch: &Batch) -> Result<f32> {
        for p in model.parameters_mut().iter() {
            p.zero_grad();
        }

        let loss = model.compute_gradients(batch)?;
        if !loss.is_finite() {
            return Err(Error::NonFiniteLoss {
                epoch: self.metrics.epoch,
                step: self.metrics.steps,
            });
        }

        if let Some(max_norm) = self.config.max_grad_norm {
            clip_grad_norm(model.parameters_mut(), max_norm);
        }
        model.apply_gradients();
        self.metrics.increment_step();

        Ok(loss)
    }

    /// Mean validation loss over `batches`, or `None` when there are none
    pub fn evaluate<M: Trainable + ?Sized>(model: &M, batches: &[Batch]) -> Result<Option<f32>> {
        if batches.is_empty() {
            return Ok(None);
        }
        let mut total = 0.0;
        for batch in batches {
            total += model.validation_loss(batch)?;
        }
        Ok(Some(total / batches.len() as f32))
    }

    /// Train for up to `max_epochs` passes over `train_batches`
    ///
    /// Validation batches, when given, are evaluated after every epoch. A
    /// non-finite training loss aborts the run with [`Error::NonFiniteLoss`].
    pub fn train<M: Trainable + ?Sized>(
        &mut self,
        model: &mut M,
        train_batches: &[Batch],
        max_epochs: usize,
        valid_batches: Option<&[Batch]>,
    ) -> Result<TrainResult> {
        self.metrics = MetricsTracker::new();
        self.start_time = Some(Instant::now());
        self.best_loss = None;

        let steps_per_epoch = train_batches.len();
        let mut stopped_early = false;
        let mut final_loss = 0.0;
        let mut final_val_loss = None;

        let ctx = self.build_context(0, max_epochs, 0, steps_per_epoch, 0.0, model.learning_rate(), None);
        if self.callbacks.on_train_begin(&ctx) == CallbackAction::Stop {
            stopped_early = true;
        }

        for epoch in 0..max_epochs {
            if stopped_early {
                break;
            }

            let ctx = self.build_context(
                epoch,
                max_epochs,
                0,
                steps_per_epoch,
                final_loss,
                model.learning_rate(),
                None,
            );
            if self.callbacks.on_epoch_begin(&ctx) == CallbackAction::Stop {
                stopped_early = true;
                break;
            }

            let mut total_loss = 0.0;
            for (step, batch) in train_batches.iter().enumerate() {
                let loss = self.train_step(model, batch).map_err(|e| match e {
                    Error::NonFiniteLoss { .. } => Error::NonFiniteLoss { epoch, step },
                    other => other,
                })?;
                total_loss += loss;

                if (step + 1) % self.config.log_interval.max(1) == 0 {
                    debug!(epoch, step = step + 1, loss, "step");
                }

                let ctx = self.build_context(
                    epoch,
                    max_epochs,
                    step,
                    steps_per_epoch,
                    loss,
                    model.learning_rate(),
                    None,
                );
                self.callbacks.on_step_end(&ctx);
            }

            let avg_loss = if steps_per_epoch > 0 {
                total_loss / steps_per_epoch as f32
            } else {
                0.0
            };
            final_loss = avg_loss;
            if self.best_loss.map_or(true, |best| avg_loss < best) {
                self.best_loss = Some(avg_loss);
            }
            self.metrics.record_epoch(avg_loss, model.learning_rate());

            let val_loss = match valid_batches {
                Some(batches) => Self::evaluate(model, batches)?,
                None => None,
            };
            if let Some(v) = val_loss {
                self.metrics.record_val_loss(v);
            }
            final_val_loss = val_loss;

            let ctx = self.build_context(
                epoch,
                max_epochs,
                steps_per_epoch,
                steps_per_epoch,
                avg_loss,
                model.learning_rate(),
                val_loss,
            );
            if self.callbacks.on_epoch_end(&ctx) == CallbackAction::Stop {
                stopped_early = true;
            }
        }

        let ctx = self.build_context(
            self.metrics.epoch,
            max_epochs,
            0,
            steps_per_epoch,
            final_loss,
            model.learning_rate(),
            final_val_loss,
        );
        self.callbacks.on_train_end(&ctx);

        Ok(TrainResult {
            final_epoch: self.metrics.epoch,
            final_loss,
            best_loss: self.best_loss.unwrap_or(final_loss),
            final_val_loss,
            stopped_early,
            elapsed_secs: self.elapsed_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::{Optimizer, SGD};
    use crate::train::EarlyStopping;
    use ndarray::{array, Array1};

    /// Fits a scalar `w` so that `w * x ≈ 2 x`
    struct Scale {
        params: Vec<Tensor>,
        optimizer: SGD,
        poison_after: Option<usize>,
        calls: usize,
    }

    impl Scale {
        fn new() -> Self {
            Self {
                params: vec![Tensor::from_vec(vec![0.0], true)],
                optimizer: SGD::new(0.1, 0.0),
                poison_after: None,
                calls: 0,
            }
        }

        fn loss(&self, batch: &Batch) -> f32 {
            let w = self.params[0].data()[0];
            batch
                .inputs()
                .column(0)
                .iter()
                .map(|x| (w * x - 2.0 * x).powi(2))
                .sum::<f32>()
                / batch.size() as f32
        }
    }

    impl Trainable for Scale {
        fn parameters_mut(&mut self) -> &mut [Tensor] {
            &mut self.params
        }

        fn compute_gradients(&mut self, batch: &Batch) -> Result<f32> {
            self.calls += 1;
            if self.poison_after.is_some_and(|n| self.calls > n) {
                return Ok(f32::NAN);
            }
            let w = self.params[0].data()[0];
            let grad = batch
                .inputs()
                .column(0)
                .iter()
                .map(|x| 2.0 * (w * x - 2.0 * x) * x)
                .sum::<f32>()
                / batch.size() as f32;
            self.params[0].accumulate_grad(Array1::from(vec![grad]));
            Ok(self.loss(batch))
        }

        fn apply_gradients(&mut self) {
            self.optimizer.step(&mut self.params);
        }

        fn validation_loss(&self, batch: &Batch) -> Result<f32> {
            Ok(self.loss(batch))
        }

        fn learning_rate(&self) -> f32 {
            self.optimizer.lr()
        }
    }

    fn batches() -> Vec<Batch> {
        vec![
            Batch::new(array![[1.0], [0.5]], vec![0, 0]).unwrap(),
            Batch::new(array![[-1.0], [0.25]], vec![0, 0]).unwrap(),
        ]
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = Scale::new();
        let mut trainer = Trainer::new(TrainConfig::new().without_grad_clip());
        let data = batches();

        let result = trainer.train(&mut model, &data, 30, Some(data.as_slice())).unwrap();

        assert_eq!(result.final_epoch, 30);
        assert!(!result.stopped_early);
        assert!(result.final_loss < trainer.metrics.losses[0]);
        assert!(result.final_val_loss.unwrap() < 1e-3);
        assert!((model.params[0].data()[0] - 2.0).abs() < 0.05);
        assert_eq!(trainer.metrics.steps, 60);
        assert_eq!(trainer.metrics.val_losses.len(), 30);
    }

    #[test]
    fn test_non_finite_loss_reports_position() {
        let mut model = Scale::new();
        model.poison_after = Some(3);
        let mut trainer = Trainer::new(TrainConfig::default());

        match trainer.train(&mut model, &batches(), 10, None) {
            Err(Error::NonFiniteLoss { epoch, step }) => {
                assert_eq!(epoch, 1);
                assert_eq!(step, 1);
            }
            other => panic!("expected NonFiniteLoss, got {other:?}"),
        }
    }

    #[test]
    fn test_early_stopping_ends_run_between_epochs() {
        let mut model = Scale::new();
        let mut trainer = Trainer::new(TrainConfig::default());
        // The first epoch sets the baseline; nothing improves on it by 1e6
        trainer.add_callback(EarlyStopping::new(2, 1e6));

        let result = trainer.train(&mut model, &batches(), 50, None).unwrap();

        assert!(result.stopped_early);
        assert_eq!(result.final_epoch, 3);
    }

    #[test]
    fn test_evaluate_without_batches() {
        let model = Scale::new();
        assert_eq!(Trainer::evaluate(&model, &[]).unwrap(), None);
    }
}
