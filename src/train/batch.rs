//! Labeled mini-batches

use crate::error::{Error, Result};
use ndarray::Array2;

/// A `batch x features` input matrix with one class label per row
#[derive(Debug, Clone)]
///
/// Rows and labels always agree in length; see [`Batch::new`].
pub struct Batch {
    inputs: Array2<f32>,
    labels: Vec<usize>,
}

impl Batch {
    pub fn new(inputs: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if inputs.nrows() != labels.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![inputs.nrows()],
                got: vec![labels.len()],
            });
        }
        Ok(Self { inputs, labels })
    }

    pub fn inputs(&self) -> &Array2<f32> {
        &self.inputs
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Split back into inputs and labels
    pub fn into_parts(self) -> (Array2<f32>, Vec<usize>) {
        (self.inputs, self.labels)
    }

    /// Number of examples
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
