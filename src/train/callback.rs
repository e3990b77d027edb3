//! Callback system for training events
//!
//! Callbacks observe the training loop and may ask it to stop. A `Stop`
//! returned from `on_train_begin`, `on_epoch_begin` or `on_epoch_end` ends the
//! run at the next epoch boundary; step events are notifications only.
//!
//! # Example
//!
//! ```rust
//! use destilar::train::callback::{CallbackAction, CallbackContext, TrainerCallback};
//!
//! struct StopAfter(usize);
//!
//! impl TrainerCallback for StopAfter {
//!     fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
//!         if ctx.epoch + 1 >= self.0 {
//!             CallbackAction::Stop
//!         } else {
//!             CallbackAction::Continue
//!         }
//!     }
//! }
//! ```

use tracing::{debug, info};

/// Snapshot of the training state handed to callbacks
#[derive(Clone, Debug, Default)]
pub struct CallbackContext {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    pub max_epochs: usize,
    /// Current step within epoch
    pub step: usize,
    pub steps_per_epoch: usize,
    pub global_step: usize,
    /// Step loss for step events, mean epoch loss for epoch events
    pub loss: f32,
    pub lr: f32,
    pub best_loss: Option<f32>,
    pub val_loss: Option<f32>,
    pub elapsed_secs: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    /// Stop training at the next epoch boundary
    Stop,
}

/// Hooks into training events
///
/// All methods have no-op defaults.
pub trait TrainerCallback: Send {
    fn on_train_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_train_end(&mut self, _ctx: &CallbackContext) {}

    fn on_epoch_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_epoch_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_step_end(&mut self, _ctx: &CallbackContext) {}

    fn name(&self) -> &str {
        "TrainerCallback"
    }
}

// =============================================================================
// Early Stopping Callback
// =============================================================================

/// Stop training when the monitored loss stops improving
///
/// # Example
///
/// ```rust
/// use destilar::train::callback::EarlyStopping;
///
/// // Stop if validation loss fails to improve by 0.001 for 5 epochs
/// let early_stop = EarlyStopping::new(5, 0.001).monitor_validation();
/// ```
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    /// Minimum improvement to reset patience
    min_delta: f32,
    best_loss: f32,
    epochs_without_improvement: usize,
    /// Monitor validation loss instead of training loss
    monitor_val: bool,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best_loss: f32::INFINITY,
            epochs_without_improvement: 0,
            monitor_val: false,
        }
    }

    /// Watch validation loss, falling back to training loss when an epoch has
    /// no validation data
    pub fn monitor_validation(mut self) -> Self {
        self.monitor_val = true;
        self
    }

    pub fn best_loss(&self) -> f32 {
        self.best_loss
    }

    fn check_improvement(&mut self, loss: f32) -> bool {
        if loss < self.best_loss - self.min_delta {
            self.best_loss = loss;
            self.epochs_without_improvement = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            false
        }
    }
}

impl TrainerCallback for EarlyStopping {
    fn on_train_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        self.best_loss = f32::INFINITY;
        self.epochs_without_improvement = 0;
        CallbackAction::Continue
    }

    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let loss = if self.monitor_val {
            ctx.val_loss.unwrap_or(ctx.loss)
        } else {
            ctx.loss
        };
        self.check_improvement(loss);

        if self.epochs_without_improvement >= self.patience {
            info!(
                patience = self.patience,
                best_loss = self.best_loss,
                "early stopping"
            );
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }

    fn name(&self) -> &str {
        "EarlyStopping"
    }
}

// =============================================================================
// Progress Callback
// =============================================================================

/// Emits epoch summaries and periodic step losses at `debug` level
#[derive(Clone, Debug)]
pub struct ProgressCallback {
    log_interval: usize,
}

impl ProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl Default for ProgressCallback {
    fn default() -> Self {
        Self::new(10)
    }
}

impl TrainerCallback for ProgressCallback {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        debug!(
            epoch = ctx.epoch + 1,
            max_epochs = ctx.max_epochs,
            loss = ctx.loss,
            val_loss = ?ctx.val_loss,
            elapsed_secs = ctx.elapsed_secs,
            "epoch finished"
        );
        CallbackAction::Continue
    }

    fn on_step_end(&mut self, ctx: &CallbackContext) {
        if (ctx.step + 1) % self.log_interval == 0 {
            debug!(
                step = ctx.step + 1,
                steps_per_epoch = ctx.steps_per_epoch,
                loss = ctx.loss,
                "training step"
            );
        }
    }

    fn name(&self) -> &str {
        "ProgressCallback"
    }
}

// =============================================================================
// Callback Manager
// =============================================================================

/// Dispatches events to registered callbacks in insertion order
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainerCallback>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.callbacks.iter().map(|cb| cb.name()).collect()
    }

    /// Every callback sees the event; any `Stop` wins
    fn dispatch<F>(&mut self, mut event: F) -> CallbackAction
    where
        F: FnMut(&mut dyn TrainerCallback) -> CallbackAction,
    {
        let mut action = CallbackAction::Continue;
        for cb in &mut self.callbacks {
            if event(cb.as_mut()) == CallbackAction::Stop {
                action = CallbackAction::Stop;
            }
        }
        action
    }

    pub fn on_train_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        self.dispatch(|cb| cb.on_train_begin(ctx))
    }

    pub fn on_train_end(&mut self, ctx: &CallbackContext) {
        for cb in &mut self.callbacks {
            cb.on_train_end(ctx);
        }
    }

    pub fn on_epoch_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        self.dispatch(|cb| cb.on_epoch_begin(ctx))
    }

    pub fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        self.dispatch(|cb| cb.on_epoch_end(ctx))
    }

    pub fn on_step_end(&mut self, ctx: &CallbackContext) {
        for cb in &mut self.callbacks {
            cb.on_step_end(ctx);
        }
    }
}
