//! Optimizers for member and distilled-model training

mod adam;
mod clip;
mod optimizer;
mod sgd;

#[cfg(test)]
mod convergence_tests;

pub use adam::Adam;
pub use clip::clip_grad_norm;
pub use optimizer::Optimizer;
pub use sgd::SGD;
