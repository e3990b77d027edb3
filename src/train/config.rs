//! Training configuration and metrics

use serde::{Deserialize, Serialize};

/// Training loop configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Maximum gradient norm for clipping (None = no clipping)
    pub max_grad_norm: Option<f32>,

    /// Emit step progress every N steps
    pub log_interval: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_grad_norm: Some(1.0),
            log_interval: 10,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grad_clip(mut self, max_norm: f32) -> Self {
        self.max_grad_norm = Some(max_norm);
        self
    }

    pub fn without_grad_clip(mut self) -> Self {
        self.max_grad_norm = None;
        self
    }

    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval.max(1);
        self
    }
}

/// Per-epoch loss history
#[derive(Clone, Debug, Default)]
pub struct MetricsTracker {
    /// Mean training loss, one per epoch
    pub losses: Vec<f32>,

    /// Mean validation loss, one per epoch with validation data
    pub val_losses: Vec<f32>,

    pub learning_rates: Vec<f32>,

    pub steps: usize,

    /// Completed epochs
    pub epoch: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_epoch(&mut self, loss: f32, lr: f32) {
        self.losses.push(loss);
        self.learning_rates.push(lr);
        self.epoch += 1;
    }

    pub fn record_val_loss(&mut self, val_loss: f32) {
        self.val_losses.push(val_loss);
    }

    pub fn increment_step(&mut self) {
        self.steps += 1;
    }

    pub fn best_loss(&self) -> Option<f32> {
        self.losses.iter().copied().reduce(f32::min)
    }

    pub fn best_val_loss(&self) -> Option<f32> {
        self.val_losses.iter().copied().reduce(f32::min)
    }

    /// Average loss over the last `n` epochs
    pub fn avg_loss(&self, n: usize) -> f32 {
        if self.losses.is_empty() {
            return 0.0;
        }

        let start = self.losses.len().saturating_sub(n);
        let window = &self.losses[start..];
        window.iter().sum::<f32>() / window.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_yaml_defaults() {
        let config = TrainConfig::new().without_grad_clip().with_log_interval(0);
        assert_eq!(config.max_grad_norm, None);
        assert_eq!(config.log_interval, 1);

        let parsed: TrainConfig = serde_yaml::from_str("max_grad_norm: 5.0").unwrap();
        assert_eq!(parsed.max_grad_norm, Some(5.0));
        assert_eq!(parsed.log_interval, 10);
    }

    #[test]
    fn test_tracker_history() {
        let mut tracker = MetricsTracker::new();
        assert_eq!(tracker.avg_loss(3), 0.0);
        assert!(tracker.best_loss().is_none());

        tracker.record_epoch(3.0, 0.1);
        tracker.record_epoch(1.0, 0.1);
        tracker.record_epoch(2.0, 0.1);
        tracker.record_val_loss(4.0);
        tracker.record_val_loss(2.5);

        assert_eq!(tracker.epoch, 3);
        assert_eq!(tracker.best_loss(), Some(1.0));
        assert_eq!(tracker.best_val_loss(), Some(2.5));
        assert_eq!(tracker.avg_loss(2), 1.5);
    }
}
