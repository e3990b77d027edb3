//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::Array1;

/// SGD optimizer with optional momentum
pub struct SGD {
    lr: f32,
    momentum: f32,
    velocities: Vec<Option<Array1<f32>>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocities: Vec::new(),
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [Tensor]) {
        if self.velocities.len() != params.len() {
            self.velocities = vec![None; params.len()];
        }

        for (i, param) in params.iter_mut().enumerate() {
            let Some(grad) = param.grad() else {
                continue;
            };

            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                let velocity = match &self.velocities[i] {
                    Some(v) => v * self.momentum - &grad * self.lr,
                    None => &grad * (-self.lr),
                };
                *param.data_mut() += &velocity;
                self.velocities[i] = Some(velocity);
            } else {
                *param.data_mut() -= &(&grad * self.lr);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn name(&self) -> &str {
        "sgd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_plain_step() {
        let mut params = vec![Tensor::from_vec(vec![1.0, -1.0], true)];
        params[0].set_grad(ndarray::arr1(&[1.0, -2.0]));

        let mut optimizer = SGD::new(0.5, 0.0);
        optimizer.step(&mut params);

        assert_eq!(params[0].data().to_vec(), vec![0.5, 0.0]);
    }

    #[test]
    fn test_sgd_set_lr() {
        let mut optimizer = SGD::new(0.1, 0.9);
        optimizer.set_lr(0.01);
        assert_eq!(optimizer.lr(), 0.01);
        assert_eq!(optimizer.name(), "sgd");
    }
}
