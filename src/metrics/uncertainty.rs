//! Entropy-based split of predictive uncertainty
//!
//! For samples p_1..p_S of a class distribution:
//!
//! - total = H(1/S Σ p_s)
//! - aleatoric = 1/S Σ H(p_s)
//! - epistemic = total - aleatoric
//!
//! Entropy is concave, so epistemic uncertainty is never negative.

use crate::error::{Error, Result};
use ndarray::{Array1, Array3, ArrayView1, Axis};

/// Per-example uncertainty components, in nats
#[derive(Debug, Clone)]
pub struct UncertaintySeparation {
    pub total: Array1<f32>,
    pub epistemic: Array1<f32>,
    pub aleatoric: Array1<f32>,
}

/// Shannon entropy `-Σ p ln p` with `0 ln 0 = 0`
pub fn entropy(p: ArrayView1<'_, f32>) -> f64 {
    p.iter()
        .filter(|&&v| v > 0.0)
        .map(|&v| {
            let v = v as f64;
            -v * v.ln()
        })
        .sum()
}

/// Split the uncertainty of a `batch x samples x classes` distribution
///
/// `labels` are not used in the computation; when present they must match
/// the batch size.
pub fn uncertainty_separation_entropy(
    predicted: &Array3<f32>,
    labels: Option<&[usize]>,
) -> Result<UncertaintySeparation> {
    let (batch, samples, _) = predicted.dim();
    if let Some(labels) = labels {
        if labels.len() != batch {
            return Err(Error::ShapeMismatch {
                expected: vec![batch],
                got: vec![labels.len()],
            });
        }
    }
    if samples == 0 {
        return Err(Error::InvalidParameter(
            "Predictive distribution has no samples".to_string(),
        ));
    }

    let mut total = Array1::zeros(batch);
    let mut epistemic = Array1::zeros(batch);
    let mut aleatoric = Array1::zeros(batch);

    for (i, example) in predicted.axis_iter(Axis(0)).enumerate() {
        // f64 sample mean so the identity holds to rounding of the final cast
        let mean = example.mapv(|v| v as f64).sum_axis(Axis(0)) / samples as f64;
        let h_total: f64 = mean
            .iter()
            .filter(|&&v| v > 0.0)
            .map(|&v| -v * v.ln())
            .sum();
        let h_aleatoric =
            example.axis_iter(Axis(0)).map(entropy).sum::<f64>() / samples as f64;

        total[i] = h_total as f32;
        aleatoric[i] = h_aleatoric as f32;
        epistemic[i] = (h_total - h_aleatoric).max(0.0) as f32;
    }

    Ok(UncertaintySeparation {
        total,
        epistemic,
        aleatoric,
    })
}
