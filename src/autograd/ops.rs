//! Autograd operations with backward passes
//!
//! Only the operations a feed-forward network needs: matrix product,
//! row-broadcast bias and ReLU.

use super::{BackwardOp, Tensor};
use ndarray::{Array1, Array2};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<Array1<f32>>>>;

fn as_matrix(t: &Tensor, rows: usize, cols: usize) -> Array2<f32> {
    t.to_array2(rows, cols)
}

fn continue_backward(t: &Tensor) {
    if let Some(op) = t.backward_op() {
        op.backward();
    }
}

/// Matrix multiplication
///
/// Computes C = A @ B where:
/// - A is m×k (flattened to length m*k)
/// - B is k×n (flattened to length k*n)
/// - C is m×n (flattened to length m*n)
pub fn matmul(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), k * n, "Matrix B size mismatch");

    let a_mat = as_matrix(a, m, k);
    let b_mat = as_matrix(b, k, n);
    let c_mat = a_mat.dot(&b_mat);

    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(Array1::from_iter(c_mat.iter().copied()), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            a_mat,
            b_mat,
            m,
            n,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
    a_mat: Array2<f32>,
    b_mat: Array2<f32>,
    m: usize,
    n: usize,
    result_grad: GradCell,
}

impl BackwardOp for MatmulBackward {
    fn backward(&self) {
        let grad_c = match self.result_grad.borrow().as_ref() {
            Some(grad) => Array2::from_shape_vec((self.m, self.n), grad.to_vec())
                .expect("gradient has the shape of the product"),
            None => return,
        };

        // ∂L/∂A = ∂L/∂C @ Bᵀ
        if self.a.requires_grad() {
            let grad_a = grad_c.dot(&self.b_mat.t());
            self.a.accumulate_grad(Array1::from_iter(grad_a.iter().copied()));
        }
        // ∂L/∂B = Aᵀ @ ∂L/∂C
        if self.b.requires_grad() {
            let grad_b = self.a_mat.t().dot(&grad_c);
            self.b.accumulate_grad(Array1::from_iter(grad_b.iter().copied()));
        }

        continue_backward(&self.a);
        continue_backward(&self.b);
    }
}

/// Add a bias vector to every row of a `rows x cols` matrix
pub fn add_bias(x: &Tensor, bias: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "Input size mismatch");
    assert_eq!(bias.len(), cols, "Bias size mismatch");

    let mut out = as_matrix(x, rows, cols);
    out += bias.data();

    let requires_grad = x.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(Array1::from_iter(out.iter().copied()), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBiasBackward {
            x: x.clone(),
            bias: bias.clone(),
            rows,
            cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBiasBackward {
    x: Tensor,
    bias: Tensor,
    rows: usize,
    cols: usize,
    result_grad: GradCell,
}

impl BackwardOp for AddBiasBackward {
    fn backward(&self) {
        let grad = match self.result_grad.borrow().as_ref() {
            Some(grad) => grad.clone(),
            None => return,
        };

        if self.x.requires_grad() {
            self.x.accumulate_grad(grad.clone());
        }
        if self.bias.requires_grad() {
            // Bias is shared by every row: sum the row gradients
            let grad_mat = Array2::from_shape_vec((self.rows, self.cols), grad.to_vec())
                .expect("gradient has the shape of the input");
            self.bias
                .accumulate_grad(grad_mat.sum_axis(ndarray::Axis(0)));
        }

        continue_backward(&self.x);
        continue_backward(&self.bias);
    }
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ReluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ReluBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for ReluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * (a > 0)
                let grad_a = grad * &self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
                self.a.accumulate_grad(grad_a);
            }

            continue_backward(&self.a);
        }
    }
}
