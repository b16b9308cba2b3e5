//! # Cifra: Convolutional MNIST Digit Classifier
//!
//! Cifra trains the classic two-stage convolutional digit classifier with a
//! tape-based autograd engine, following the managed-container training
//! contract: IDX data in, safetensors snapshot out, with optional gradient
//! averaging across a host replica group.
//!
//! ## Architecture
//!
//! - **autograd**: Tape-based automatic differentiation
//! - **nn**: Convolutional and linear layers, and the fixed classifier
//! - **data**: IDX parsing, samplers, and batch loading
//! - **dist**: Host topology and replica gradient averaging
//! - **optim**: Momentum SGD
//! - **train**: High-level training loop
//! - **config**: CLI and container environment contract
//! - **io**: Model saving and loading (safetensors, JSON, YAML formats)

pub mod autograd;
pub mod config;
pub mod data;
pub mod dist;
pub mod io;
pub mod nn;
pub mod optim;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Context, Tensor};
pub use error::{Error, Result};
