//! Likelihood losses for distribution-valued students

use super::GaussianParams;
use crate::error::{Error, Result};
use ndarray::{Array2, Array3, Axis};

/// Loss value with gradients w.r.t. the distribution parameters
#[derive(Debug, Clone)]
pub struct LossGrad {
    pub loss: f32,
    /// ∂L/∂mean, `batch x K`
    pub d_mean: Array2<f32>,
    /// ∂L/∂variance, `batch x K`
    pub d_variance: Array2<f32>,
}

/// Loss between a diagonal Gaussian and a set of target vectors per example
pub trait GaussianLoss {
    /// `targets` is `batch x members x K`
    fn loss_and_grad(&self, params: &GaussianParams, targets: &Array3<f32>) -> Result<LossGrad>;

    fn name(&self) -> &str;
}

/// Negative log-likelihood of teacher logits under N(mean, diag(variance))
///
/// ```text
/// L = 1/(B M) Σ_b Σ_m Σ_k ½ [ln 2π + ln σ²_bk + (t_bmk - μ_bk)² / σ²_bk]
/// ```
///
/// Sums over classes, averages over examples and ensemble members.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianNll;

impl GaussianNll {
    pub fn loss(&self, params: &GaussianParams, targets: &Array3<f32>) -> Result<f32> {
        self.loss_and_grad(params, targets).map(|lg| lg.loss)
    }
}

impl GaussianLoss for GaussianNll {
    fn loss_and_grad(&self, params: &GaussianParams, targets: &Array3<f32>) -> Result<LossGrad> {
        let (batch, k) = params.mean.dim();
        let (t_batch, members, t_k) = targets.dim();
        if t_batch != batch || t_k != k || members == 0 || params.variance.dim() != (batch, k) {
            return Err(Error::ShapeMismatch {
                expected: vec![batch, members.max(1), k],
                got: vec![t_batch, members, t_k],
            });
        }

        let norm = (batch * members) as f64;
        let ln_2pi = (2.0 * std::f64::consts::PI).ln();
        let mut total = 0.0f64;
        let mut d_mean = Array2::zeros((batch, k));
        let mut d_variance = Array2::zeros((batch, k));

        for (b, example) in targets.axis_iter(Axis(0)).enumerate() {
            for j in 0..k {
                let mu = params.mean[[b, j]] as f64;
                let var = params.variance[[b, j]] as f64;
                let mut dm = 0.0f64;
                let mut dv = 0.0f64;
                for t in example.column(j) {
                    let diff = *t as f64 - mu;
                    let sq = diff * diff;
                    total += 0.5 * (ln_2pi + var.ln() + sq / var);
                    dm -= diff / var;
                    dv += 0.5 * (1.0 / var - sq / (var * var));
                }
                d_mean[[b, j]] = (dm / norm) as f32;
                d_variance[[b, j]] = (dv / norm) as f32;
            }
        }

        Ok(LossGrad {
            loss: (total / norm) as f32,
            d_mean,
            d_variance,
        })
    }

    fn name(&self) -> &str {
        "GaussianNLL"
    }
}
