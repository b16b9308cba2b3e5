//! Optimizers for training neural networks

mod optimizer;
mod sgd;

pub use optimizer::Optimizer;
pub use sgd::SGD;
