//! Configuration validation

use super::schema::{EnsembleSpec, OptimSpec, PipelineSpec};

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Ensemble needs at least one member")]
    NoMembers,

    #[error("Invalid output size: {0} (must be >= 2)")]
    InvalidOutputSize(usize),

    #[error("Invalid layer sizes: {0:?} (need input and output widths, all > 0)")]
    InvalidLayerSizes(Vec<usize>),

    #[error("Classifier output width {got} does not match ensemble output size {expected}")]
    OutputMismatch { expected: usize, got: usize },

    #[error("Distilled output width {0} must be twice the number of modelled logits")]
    OddDistillWidth(usize),

    #[error("Invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid optimizer: {0} (must be one of: adam, sgd)")]
    InvalidOptimizer(String),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid variance lower bound: {0} (must be >= 0.0)")]
    InvalidVarianceBound(f32),

    #[error("Invalid sample count: {0} (must be > 0)")]
    InvalidNumSamples(usize),

    #[error("Student input width {got} does not match ensemble input width {expected}")]
    InputMismatch { expected: usize, got: usize },
}

fn check_layers(sizes: &[usize]) -> Result<(), ValidationError> {
    if sizes.len() < 2 || sizes.contains(&0) {
        return Err(ValidationError::InvalidLayerSizes(sizes.to_vec()));
    }
    Ok(())
}

fn check_lr(lr: f32) -> Result<(), ValidationError> {
    if !(lr > 0.0) {
        return Err(ValidationError::InvalidLearningRate(lr));
    }
    Ok(())
}

fn check_optimizer(spec: &OptimSpec) -> Result<(), ValidationError> {
    match spec.name.to_lowercase().as_str() {
        "adam" | "sgd" => check_lr(spec.lr),
        _ => Err(ValidationError::InvalidOptimizer(spec.name.clone())),
    }
}

fn check_clip(max_norm: Option<f32>) -> Result<(), ValidationError> {
    match max_norm {
        Some(clip) if !(clip > 0.0) => Err(ValidationError::InvalidGradClip(clip)),
        _ => Ok(()),
    }
}

fn validate_ensemble(spec: &EnsembleSpec) -> Result<(), ValidationError> {
    if spec.num_members == 0 {
        return Err(ValidationError::NoMembers);
    }
    if spec.output_size < 2 {
        return Err(ValidationError::InvalidOutputSize(spec.output_size));
    }
    if spec.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(spec.epochs));
    }

    let layers = &spec.classifier.layer_sizes;
    check_layers(layers)?;
    let last = layers[layers.len() - 1];
    if last != spec.output_size {
        return Err(ValidationError::OutputMismatch {
            expected: spec.output_size,
            got: last,
        });
    }

    check_optimizer(&spec.classifier.optimizer)?;
    check_clip(spec.training.max_grad_norm)
}

/// Validate a pipeline specification
///
/// Checks numeric ranges, optimizer names and that layer widths line up
/// between the ensemble and the distilled model.
pub fn validate_config(spec: &PipelineSpec) -> Result<(), ValidationError> {
    validate_ensemble(&spec.ensemble)?;

    let Some(distill) = &spec.distill else {
        return Ok(());
    };
    let model = &distill.model;
    check_layers(&model.layer_sizes)?;

    let input = model.layer_sizes[0];
    let ensemble_input = spec.ensemble.classifier.layer_sizes[0];
    if input != ensemble_input {
        return Err(ValidationError::InputMismatch {
            expected: ensemble_input,
            got: input,
        });
    }

    let width = model.layer_sizes[model.layer_sizes.len() - 1];
    if width % 2 != 0 {
        return Err(ValidationError::OddDistillWidth(width));
    }

    check_lr(model.learning_rate)?;
    if distill.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(distill.epochs));
    }
    if !model.variance_lower_bound.is_finite() || model.variance_lower_bound < 0.0 {
        return Err(ValidationError::InvalidVarianceBound(
            model.variance_lower_bound,
        ));
    }
    if model.default_num_samples == 0 {
        return Err(ValidationError::InvalidNumSamples(0));
    }
    check_clip(model.training.max_grad_norm)
}
