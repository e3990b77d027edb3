//! YAML schema for a declarative ensemble + distillation pipeline

use crate::distill::LogitsDistributionConfig;
use crate::ensemble::ClassifierConfig;
use crate::train::TrainConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete pipeline: an ensemble, optionally followed by a distilled student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub ensemble: EnsembleSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distill: Option<DistillSpec>,
}

/// Ensemble of identically configured classifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleSpec {
    pub num_members: usize,

    /// Number of classes every member predicts
    pub output_size: usize,

    /// Shared member configuration; member `i` is seeded with `seed + i`
    pub classifier: ClassifierConfig,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default)]
    pub training: TrainConfig,
}

/// Distilled model built on top of the trained ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillSpec {
    #[serde(flatten)]
    pub model: LogitsDistributionConfig,

    #[serde(default = "default_epochs")]
    pub epochs: usize,
}

/// Optimizer specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimSpec {
    /// Optimizer name: "adam" | "sgd"
    pub name: String,

    pub lr: f32,

    /// Optimizer-specific parameters (beta1, beta2, eps, momentum)
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
}

impl OptimSpec {
    pub fn adam(lr: f32) -> Self {
        Self {
            name: "adam".to_string(),
            lr,
            params: HashMap::new(),
        }
    }

    pub fn sgd(lr: f32, momentum: f32) -> Self {
        let mut params = HashMap::new();
        params.insert("momentum".to_string(), serde_json::json!(momentum));
        Self {
            name: "sgd".to_string(),
            lr,
            params,
        }
    }
}

impl Default for OptimSpec {
    fn default() -> Self {
        Self::adam(0.001)
    }
}

fn default_epochs() -> usize {
    10
}
