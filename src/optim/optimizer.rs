//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
///
/// Optimizers keep per-parameter state indexed by position, so the same
/// parameter slice (same order) must be passed to every call.
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Short name used in logs
    fn name(&self) -> &str;
}
