//! Training loop
//!
//! - [`Batch`]: labeled input matrix
//! - [`Trainable`] / [`Trainer`]: epoch loop with gradient clipping,
//!   validation and callbacks
//! - [`CrossEntropyLoss`]: classification loss for ensemble members
//!
//! # Example
//!
//! ```no_run
//! use destilar::train::{ProgressCallback, TrainConfig, Trainer};
//!
//! let mut trainer = Trainer::new(TrainConfig::default().with_log_interval(50));
//! trainer.add_callback(ProgressCallback::new(50));
//! // trainer.train(&mut model, &batches, 10, None)?;
//! ```

mod batch;
pub mod callback;
mod config;
mod loss;
mod trainer;

pub use batch::Batch;
pub use callback::{
    CallbackAction, CallbackContext, CallbackManager, EarlyStopping, ProgressCallback,
    TrainerCallback,
};
pub use config::{MetricsTracker, TrainConfig};
pub use loss::{softmax_rows, CrossEntropyLoss};
pub use trainer::{TrainResult, Trainable, Trainer};
