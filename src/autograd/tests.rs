//! Tests for autograd operations with gradient checking

use super::*;
use approx::assert_abs_diff_eq;
use proptest::prelude::*;

/// Finite difference gradient checker
///
/// Computes numerical gradient using central difference:
/// f'(x) ≈ (f(x + h) - f(x - h)) / (2h)
fn finite_difference<F>(f: F, x: &[f32], epsilon: f32) -> Vec<f32>
where
    F: Fn(&[f32]) -> f32,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + epsilon;
        x_minus[i] = x[i] - epsilon;

        grad[i] = (f(&x_plus) - f(&x_minus)) / (2.0 * epsilon);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }

    grad
}

/// Sum of one dense layer with ReLU, used as a scalar objective
fn layer_objective(x: &[f32], w: &[f32], b: &[f32], rows: usize, k: usize, n: usize) -> f32 {
    let xt = Tensor::from_vec(x.to_vec(), false);
    let wt = Tensor::from_vec(w.to_vec(), false);
    let bt = Tensor::from_vec(b.to_vec(), false);
    relu(&add_bias(&matmul(&xt, &wt, rows, k, n), &bt, rows, n))
        .data()
        .sum()
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_tensor_grad_accumulation() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);

        t.accumulate_grad(ndarray::arr1(&[1.0, 1.0, 1.0]));
        assert_eq!(t.grad().unwrap()[0], 1.0);

        t.accumulate_grad(ndarray::arr1(&[1.0, 1.0, 1.0]));
        assert_eq!(t.grad().unwrap()[0], 2.0);
    }

    #[test]
    fn test_matmul_forward() {
        // [[1, 2], [3, 4]] @ [[5], [6]] = [[17], [39]]
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let b = Tensor::from_vec(vec![5.0, 6.0], false);
        let c = matmul(&a, &b, 2, 2, 1);

        assert_abs_diff_eq!(c.data()[0], 17.0);
        assert_abs_diff_eq!(c.data()[1], 39.0);
        assert!(!c.requires_grad());
    }

    #[test]
    fn test_matmul_backward() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], true);
        let b = Tensor::from_vec(vec![5.0, 6.0], true);
        let mut c = matmul(&a, &b, 2, 2, 1);

        backward(&mut c, None);

        // ∂sum/∂A[i,p] = B[p]
        let grad_a = a.grad().unwrap();
        assert_abs_diff_eq!(grad_a[0], 5.0);
        assert_abs_diff_eq!(grad_a[1], 6.0);
        assert_abs_diff_eq!(grad_a[2], 5.0);
        assert_abs_diff_eq!(grad_a[3], 6.0);

        // ∂sum/∂B[p] = Σ_i A[i,p]
        let grad_b = b.grad().unwrap();
        assert_abs_diff_eq!(grad_b[0], 4.0);
        assert_abs_diff_eq!(grad_b[1], 6.0);
    }

    #[test]
    fn test_add_bias_broadcasts_rows() {
        let x = Tensor::from_vec(vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0], true);
        let bias = Tensor::from_vec(vec![10.0, 20.0], true);
        let mut y = add_bias(&x, &bias, 3, 2);

        assert_eq!(y.data().to_vec(), vec![10.0, 20.0, 11.0, 21.0, 12.0, 22.0]);

        backward(&mut y, None);
        assert_eq!(bias.grad().unwrap().to_vec(), vec![3.0, 3.0]);
        assert_eq!(x.grad().unwrap().to_vec(), vec![1.0; 6]);
    }

    #[test]
    fn test_relu_masks_negative_gradient() {
        let a = Tensor::from_vec(vec![-1.0, 0.5, 2.0], true);
        let mut y = relu(&a);
        assert_eq!(y.data().to_vec(), vec![0.0, 0.5, 2.0]);

        backward(&mut y, Some(ndarray::arr1(&[3.0, 3.0, 3.0])));
        assert_eq!(a.grad().unwrap().to_vec(), vec![0.0, 3.0, 3.0]);
    }

    #[test]
    fn test_detach_drops_graph() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = Tensor::from_vec(vec![1.0, 1.0], true);
        let c = matmul(&a, &b, 1, 2, 1);
        let d = c.detach();

        assert!(d.backward_op().is_none());
        assert!(!d.requires_grad());
        assert_eq!(d.data(), c.data());
    }

    #[test]
    fn test_context_modes() {
        let mut ctx = Context::on(Device::Cpu);
        assert!(ctx.is_training());
        ctx.eval();
        assert!(!ctx.is_training());
        ctx.train();
        assert!(ctx.is_training());
        assert_eq!(ctx.device().to_string(), "cpu");
    }
}

proptest! {
    /// Analytic weight gradients of a dense ReLU layer match finite differences
    #[test]
    fn prop_dense_layer_gradient_matches_finite_difference(
        x in prop::collection::vec(-2.0f32..2.0, 6),
        w in prop::collection::vec(-1.0f32..1.0, 4),
        b in prop::collection::vec(0.5f32..1.5, 2),
    ) {
        // 3x2 input, 2x2 weights; positive bias keeps most units away from the kink
        let xt = Tensor::from_vec(x.clone(), false);
        let wt = Tensor::from_vec(w.clone(), true);
        let bt = Tensor::from_vec(b.clone(), true);
        let mut out = relu(&add_bias(&matmul(&xt, &wt, 3, 2, 2), &bt, 3, 2));
        backward(&mut out, None);

        let pre: Vec<f32> = matmul(&xt.detach(), &wt.detach(), 3, 2, 2)
            .data()
            .iter()
            .enumerate()
            .map(|(i, v)| v + b[i % 2])
            .collect();
        prop_assume!(pre.iter().all(|v| v.abs() > 1e-2));

        let numeric = finite_difference(|w| layer_objective(&x, w, &b, 3, 2, 2), &w, 1e-3);
        let analytic = wt.grad().unwrap();
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            prop_assert!((a - n).abs() < 5e-2, "analytic {} vs numeric {}", a, n);
        }
    }
}
