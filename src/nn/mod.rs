//! Feed-forward building blocks on top of the autograd tape

mod mlp;

pub use mlp::Mlp;
