//! Ensemble member contract

use crate::error::Result;
use crate::io::Model;
use crate::train::{softmax_rows, Trainable};
use ndarray::Array2;

/// An independently trainable classifier that can live in an [`super::Ensemble`]
pub trait Member: Trainable {
    fn input_size(&self) -> usize;

    /// Number of classes the member scores
    fn output_size(&self) -> usize;

    /// Pre-softmax scores, `batch x output_size`
    fn logits(&self, inputs: &Array2<f32>) -> Result<Array2<f32>>;

    /// Class probabilities, `batch x output_size`
    fn predict(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        Ok(softmax_rows(&self.logits(inputs)?))
    }

    /// Snapshot of the parameters and the hyperparameters needed to rebuild
    fn to_model(&self) -> Model;

    /// Rebuild a member from a [`Model`] written by [`Member::to_model`]
    fn from_model(model: &Model) -> Result<Self>
    where
        Self: Sized;
}
