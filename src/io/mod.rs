//! Model I/O
//!
//! Models are persisted as metadata plus named, shaped `f32` parameters in
//! JSON, YAML or SafeTensors. The format is picked from the file extension on
//! load.

mod format;
mod load;
mod model;
mod save;

#[cfg(test)]
mod tests;

pub use format::{ModelFormat, SaveConfig};
pub use load::load_model;
pub use model::{Model, ModelMetadata, ModelState, Parameter, ParameterInfo};
pub use save::save_model;
