//! Tape-based autograd engine
//!
//! Every operation records a [`BackwardOp`] on its output; calling
//! [`backward`] on the final tensor walks those records back to the leaves.
//! The graph must be a chain or tree: a tensor consumed by two operations
//! would have its upstream ops replayed once per consumer.

mod context;
mod ops;
mod tensor;

#[cfg(test)]
mod tests;

pub use context::{Context, Device};
pub use ops::{add_bias, matmul, relu};
pub use tensor::Tensor;

use ndarray::Array1;

/// Backward step recorded by an operation
pub trait BackwardOp {
    /// Push the output gradient to the operation's inputs and recurse
    fn backward(&self);
}

/// Perform backward pass on a tensor
///
/// `grad_output` defaults to ones, which is what a scalar loss needs.
pub fn backward(tensor: &mut Tensor, grad_output: Option<Array1<f32>>) {
    let grad = grad_output.unwrap_or_else(|| Array1::ones(tensor.len()));
    tensor.set_grad(grad);

    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}
