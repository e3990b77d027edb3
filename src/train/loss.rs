//! Classification loss

use crate::autograd::BackwardOp;
use crate::error::{Error, Result};
use crate::Tensor;
use ndarray::{Array1, Array2, Axis};
use std::cell::RefCell;
use std::rc::Rc;

/// Row-wise softmax with max subtraction for stability
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}

/// Mean cross entropy between row logits and integer class labels
///
/// L = -1/B Σ_i log softmax(z_i)[y_i]
///
/// # Example
///
/// ```
/// use destilar::train::CrossEntropyLoss;
/// use destilar::Tensor;
///
/// let logits = Tensor::from_vec(vec![2.0, 1.0, 0.5], true);
/// let loss = CrossEntropyLoss.forward(&logits, &[0], 3).unwrap();
/// assert!(loss.data()[0] > 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Compute the loss over flattened `labels.len() x num_classes` logits
    ///
    /// The returned scalar carries a backward op that continues into the
    /// graph that produced `logits`.
    pub fn forward(&self, logits: &Tensor, labels: &[usize], num_classes: usize) -> Result<Tensor> {
        let batch = labels.len();
        if batch == 0 || logits.len() != batch * num_classes {
            return Err(Error::ShapeMismatch {
                expected: vec![batch, num_classes],
                got: vec![logits.len()],
            });
        }
        if let Some(&bad) = labels.iter().find(|&&y| y >= num_classes) {
            return Err(Error::InvalidParameter(format!(
                "Label {bad} out of range for {num_classes} classes"
            )));
        }

        let probs = softmax_rows(&logits.to_array2(batch, num_classes));
        let ce = labels
            .iter()
            .enumerate()
            .map(|(i, &y)| -(probs[[i, y]] + 1e-10).ln())
            .sum::<f32>()
            / batch as f32;

        let mut loss = Tensor::from_vec(vec![ce], logits.requires_grad());

        if logits.requires_grad() {
            // ∂L/∂z = (softmax(z) - onehot(y)) / B
            let mut grad = probs;
            for (i, &y) in labels.iter().enumerate() {
                grad[[i, y]] -= 1.0;
            }
            grad /= batch as f32;

            loss.set_backward_op(Rc::new(CrossEntropyBackward {
                logits: logits.clone(),
                loss_grad: loss.grad_cell(),
                grad: Array1::from_iter(grad.iter().copied()),
            }));
        }

        Ok(loss)
    }

    pub fn name(&self) -> &str {
        "CrossEntropy"
    }
}

struct CrossEntropyBackward {
    logits: Tensor,
    loss_grad: Rc<RefCell<Option<Array1<f32>>>>,
    grad: Array1<f32>,
}

impl BackwardOp for CrossEntropyBackward {
    fn backward(&self) {
        let scale = self
            .loss_grad
            .borrow()
            .as_ref()
            .map(|g| g[0])
            .unwrap_or(1.0);
        self.logits.accumulate_grad(&self.grad * scale);

        if let Some(op) = self.logits.backward_op() {
            op.backward();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let p = softmax_rows(&array![[1.0, 2.0, 3.0], [1000.0, 1000.0, -1000.0]]);
        for row in p.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
        assert_relative_eq!(p[[1, 0]], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_uniform_logits_give_log_k() {
        let logits = Tensor::from_vec(vec![0.0; 8], false);
        let loss = CrossEntropyLoss.forward(&logits, &[0, 3], 4).unwrap();
        assert_relative_eq!(loss.data()[0], 4.0f32.ln(), epsilon = 1e-5);
    }

    #[test]
    fn test_gradient_is_softmax_minus_onehot() {
        let logits = Tensor::from_vec(vec![0.0, 0.0], true);
        let mut loss = CrossEntropyLoss.forward(&logits, &[1], 2).unwrap();
        backward(&mut loss, None);

        let grad = logits.grad().unwrap();
        assert_relative_eq!(grad[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(grad[1], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_bad_labels_and_shapes() {
        let logits = Tensor::from_vec(vec![0.0; 4], false);
        assert!(matches!(
            CrossEntropyLoss.forward(&logits, &[0, 2], 2),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            CrossEntropyLoss.forward(&logits, &[0], 2),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
