//! Property-based convergence tests for optimizers

use crate::optim::*;
use crate::Tensor;
use proptest::prelude::*;

/// Run `iterations` steps on f(x) = Σx² and report whether every
/// coordinate ended below `threshold`
fn converges_on_quadratic<O: Optimizer>(mut optimizer: O, iterations: usize, threshold: f32) -> bool {
    let mut params = vec![Tensor::from_vec(vec![3.0, -2.0, 1.5, -2.5], true)];

    for _ in 0..iterations {
        let grad = params[0].data().mapv(|x| 2.0 * x);
        params[0].set_grad(grad);
        optimizer.step(&mut params);
    }

    params[0].data().iter().all(|&val| val.abs() < threshold)
}

proptest! {
    #[test]
    fn prop_sgd_converges_quadratic(
        lr in 0.01f32..0.5,
        momentum in 0.0f32..0.9
    ) {
        prop_assert!(converges_on_quadratic(SGD::new(lr, momentum), 100, 1.0));
    }

    #[test]
    fn prop_adam_converges_quadratic(lr in 0.05f32..0.5) {
        prop_assert!(converges_on_quadratic(Adam::default_params(lr), 100, 1.5));
    }
}

#[test]
fn test_sgd_with_momentum_faster_than_no_momentum() {
    let mut params_with = vec![Tensor::from_vec(vec![10.0], true)];
    let mut params_without = vec![Tensor::from_vec(vec![10.0], true)];

    let mut opt_with = SGD::new(0.01, 0.9);
    let mut opt_without = SGD::new(0.01, 0.0);

    for _ in 0..20 {
        params_with[0].set_grad(ndarray::arr1(&[2.0 * params_with[0].data()[0]]));
        params_without[0].set_grad(ndarray::arr1(&[2.0 * params_without[0].data()[0]]));

        opt_with.step(&mut params_with);
        opt_without.step(&mut params_without);
    }

    assert!(params_with[0].data()[0].abs() < params_without[0].data()[0].abs());
}
