//! Build live objects from configuration

use super::schema::{DistillSpec, EnsembleSpec, OptimSpec};
use crate::distill::{LogitsDistribution, TeacherModel};
use crate::ensemble::{Ensemble, MlpClassifier};
use crate::error::{Error, Result};
use crate::optim::{Adam, Optimizer, SGD};

fn param(spec: &OptimSpec, key: &str, default: f32) -> f32 {
    spec.params
        .get(key)
        .and_then(|v| v.as_f64())
        .map_or(default, |v| v as f32)
}

/// Build optimizer from configuration
pub fn build_optimizer(spec: &OptimSpec) -> Result<Box<dyn Optimizer>> {
    match spec.name.to_lowercase().as_str() {
        "sgd" => Ok(Box::new(SGD::new(spec.lr, param(spec, "momentum", 0.0)))),
        "adam" => Ok(Box::new(Adam::new(
            spec.lr,
            param(spec, "beta1", 0.9),
            param(spec, "beta2", 0.999),
            param(spec, "eps", 1e-8),
        ))),
        name => Err(Error::ConfigError(format!(
            "Unknown optimizer: {}. Supported: sgd, adam",
            name
        ))),
    }
}

/// Build an untrained ensemble
///
/// Member `i` gets seed `seed + i` when the classifier config carries a seed,
/// so members differ in initialization but the whole ensemble is reproducible.
pub fn build_ensemble(spec: &EnsembleSpec) -> Result<Ensemble> {
    let mut ensemble = Ensemble::new(spec.output_size).with_train_config(spec.training.clone());
    for i in 0..spec.num_members {
        let mut config = spec.classifier.clone();
        config.seed = config.seed.map(|seed| seed.wrapping_add(i as u64));
        ensemble.add_member(MlpClassifier::new(config)?)?;
    }
    Ok(ensemble)
}

/// Build a Gaussian-over-logits student for `teacher`
pub fn build_distilled<'t, T>(teacher: &'t T, spec: &DistillSpec) -> Result<LogitsDistribution<'t, T>>
where
    T: TeacherModel + ?Sized,
{
    LogitsDistribution::new(teacher, spec.model.clone())
}
