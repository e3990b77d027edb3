//! Declarative YAML configuration
//!
//! A pipeline file describes an ensemble and, optionally, the student
//! distilled from it.
//!
//! # Example
//!
//! ```yaml
//! ensemble:
//!   num_members: 5
//!   output_size: 3
//!   epochs: 20
//!   classifier:
//!     layer_sizes: [4, 32, 3]
//!     seed: 42
//!     optimizer:
//!       name: adam
//!       lr: 0.01
//!
//! distill:
//!   layer_sizes: [4, 64, 6]
//!   learning_rate: 0.001
//!   epochs: 50
//! ```

mod builder;
mod schema;
mod validate;


pub use builder::{build_distilled, build_ensemble, build_optimizer};
pub use schema::{DistillSpec, EnsembleSpec, OptimSpec, PipelineSpec};
pub use validate::{validate_config, ValidationError};

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read, parse and validate a pipeline description
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineSpec> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&yaml)
}

/// Parse and validate a pipeline description held in memory
pub fn parse_config(yaml: &str) -> Result<PipelineSpec> {
    let spec: PipelineSpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {}", e)))?;
    validate_config(&spec).map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;
    Ok(spec)
}
