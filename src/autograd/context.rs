//! Execution context: compute device and train/eval mode

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute device a model is placed on
///
/// Placement is chosen at construction and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host CPU, vectorized through ndarray
    #[default]
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Context for managing the computational graph
#[derive(Debug, Clone)]
pub struct Context {
    device: Device,
    training: bool,
}

impl Context {
    /// Create a new context on the default device, in training mode
    pub fn new() -> Self {
        Self::on(Device::default())
    }

    /// Create a context bound to `device`
    pub fn on(device: Device) -> Self {
        Self {
            device,
            training: true,
        }
    }

    /// Device this context computes on
    pub fn device(&self) -> Device {
        self.device
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Check if in training mode
    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
