//! Gradient clipping

use crate::Tensor;

/// Clip gradients by global norm
///
/// Scales every gradient by `max_norm / global_norm` when the global norm
/// exceeds `max_norm`. Returns the norm measured before clipping.
pub fn clip_grad_norm(params: &mut [Tensor], max_norm: f32) -> f32 {
    let total_norm_sq: f32 = params
        .iter()
        .filter_map(|p| p.grad())
        .map(|g| g.iter().map(|&v| v * v).sum::<f32>())
        .sum();
    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for param in params.iter() {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * clip_coef);
            }
        }
    }

    global_norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clip_scales_to_max_norm() {
        let mut params = vec![
            Tensor::from_vec(vec![0.0, 0.0], true),
            Tensor::from_vec(vec![0.0], true),
        ];
        params[0].set_grad(ndarray::arr1(&[3.0, 0.0]));
        params[1].set_grad(ndarray::arr1(&[4.0]));

        let norm = clip_grad_norm(&mut params, 1.0);
        assert_relative_eq!(norm, 5.0, epsilon = 1e-6);

        let g0 = params[0].grad().unwrap();
        let g1 = params[1].grad().unwrap();
        let clipped = (g0[0] * g0[0] + g1[0] * g1[0]).sqrt();
        assert_relative_eq!(clipped, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_clip_leaves_small_gradients() {
        let mut params = vec![Tensor::from_vec(vec![0.0], true)];
        params[0].set_grad(ndarray::arr1(&[0.5]));

        clip_grad_norm(&mut params, 1.0);
        assert_eq!(params[0].grad().unwrap()[0], 0.5);
    }

    #[test]
    fn test_clip_skips_params_without_grad() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        assert_eq!(clip_grad_norm(&mut params, 1.0), 0.0);
        assert!(params[0].grad().is_none());
    }
}
