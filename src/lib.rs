//! # Destilar: Ensemble Distillation for Predictive Uncertainty
//!
//! Destilar trains ensembles of independent classifiers and distills them
//! into a single network that predicts a Gaussian over the ensemble's logits.
//! Sampling from that Gaussian recovers the ensemble's spread, so the student
//! can separate aleatoric from epistemic uncertainty at a fraction of the
//! inference cost.
//!
//! ## Architecture
//!
//! - **autograd**: Tape-based automatic differentiation
//! - **nn**: Multi-layer perceptron on the tape
//! - **optim**: Optimizers (SGD, Adam) and gradient clipping
//! - **train**: Generic training loop with callbacks
//! - **ensemble**: Independently trained members and their stacked outputs
//! - **distill**: Distilled models, including the Gaussian-over-logits student
//! - **metrics**: Accuracy and entropy-based uncertainty decomposition
//! - **config**: Declarative YAML pipeline configuration
//! - **io**: Model saving and loading (JSON, YAML, SafeTensors)
//!
//! ## Example
//!
//! ```no_run
//! use destilar::config::{build_distilled, build_ensemble, load_config};
//! use destilar::metrics::uncertainty_separation_entropy;
//! use destilar::DistilledModel;
//! # let batches: Vec<destilar::Batch> = vec![];
//!
//! let spec = load_config("pipeline.yaml")?;
//! let mut ensemble = build_ensemble(&spec.ensemble)?;
//! ensemble.train(&batches, spec.ensemble.epochs, None);
//!
//! if let Some(distill) = &spec.distill {
//!     let mut student = build_distilled(&ensemble, distill)?;
//!     student.train(&batches, distill.epochs, None)?;
//! #   let inputs = ndarray::Array2::zeros((1, 4));
//!     let samples = student.predict(&inputs, None)?;
//!     let split = uncertainty_separation_entropy(&samples, None)?;
//!     println!("epistemic: {}", split.epistemic);
//! }
//! # Ok::<(), destilar::Error>(())
//! ```

pub mod autograd;
pub mod config;
pub mod distill;
pub mod ensemble;
pub mod io;
pub mod metrics;
pub mod nn;
pub mod optim;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Context, Device, Tensor};
pub use distill::{DistilledModel, LogitsDistribution, LogitsDistributionConfig, TeacherModel};
pub use ensemble::{ClassifierConfig, Ensemble, Member, MlpClassifier};
pub use error::{Error, Result};
pub use train::{Batch, TrainConfig, Trainer};
