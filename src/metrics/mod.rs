//! Evaluation metrics over predictive distributions
//!
//! A predictive distribution is a `batch x samples x classes` array: one
//! probability vector per example and per sample. Samples are ensemble
//! members for an [`crate::Ensemble`] and Monte-Carlo draws for a distilled
//! model.

mod uncertainty;

#[cfg(test)]
mod tests;

pub use uncertainty::{entropy, uncertainty_separation_entropy, UncertaintySeparation};

use ndarray::{Array2, Array3, Axis};
use std::fmt;

/// Signature of a registered metric: `(labels, predicted_distribution) -> value`
pub type MetricFn = dyn Fn(&[usize], &Array3<f32>) -> f32;

/// A named evaluation function
pub struct Metric {
    pub name: String,
    function: Box<MetricFn>,
}

impl Metric {
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[usize], &Array3<f32>) -> f32 + 'static,
    {
        Self {
            name: name.into(),
            function: Box::new(function),
        }
    }

    /// The stock accuracy metric, registered as "Acc"
    pub fn accuracy() -> Self {
        Self::new("Acc", accuracy)
    }

    pub fn evaluate(&self, labels: &[usize], predicted: &Array3<f32>) -> f32 {
        (self.function)(labels, predicted)
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric").field("name", &self.name).finish()
    }
}

/// Probability vectors averaged over the sample axis, `batch x classes`
pub fn sample_mean(predicted: &Array3<f32>) -> Array2<f32> {
    predicted
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array2::zeros((predicted.shape()[0], predicted.shape()[2])))
}

/// Index of the largest entry in each row; ties go to the lowest index
pub fn argmax_rows(values: &Array2<f32>) -> Vec<usize> {
    values
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
                    if v > max {
                        (i, v)
                    } else {
                        (best, max)
                    }
                })
                .0
        })
        .collect()
}

/// Fraction of examples whose sample-averaged arg-max equals the label
///
/// # Panics
///
/// Panics if `labels` and the batch axis of `predicted` differ in length.
pub fn accuracy(labels: &[usize], predicted: &Array3<f32>) -> f32 {
    assert_eq!(
        labels.len(),
        predicted.shape()[0],
        "Labels and predictions must cover the same batch"
    );
    if labels.is_empty() {
        return 0.0;
    }

    let predicted_classes = argmax_rows(&sample_mean(predicted));
    let correct = predicted_classes
        .iter()
        .zip(labels)
        .filter(|(p, y)| p == y)
        .count();

    correct as f32 / labels.len() as f32
}
