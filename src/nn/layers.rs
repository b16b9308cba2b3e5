//! Trainable layer primitives
//!
//! Layers own their parameters as flat tensors with explicit dimensions
//! and wrap the corresponding autograd ops. Fresh parameters are drawn
//! from U(-1/√fan_in, +1/√fan_in), biases included.

use crate::autograd::{conv2d, linear, Tensor};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::Rng;

/// Draw `len` samples uniformly from [-bound, bound)
fn uniform(rng: &mut StdRng, len: usize, bound: f32) -> Tensor {
    let data: Vec<f32> = (0..len)
        .map(|_| (rng.random::<f32>() * 2.0 - 1.0) * bound)
        .collect();
    Tensor::from_vec(data, true)
}

/// 2D convolution layer with square kernels, unit stride, no padding
pub struct Conv2d {
    /// Filter weights stored as 1D [out_channels * in_channels * kernel * kernel]
    weight: Tensor,
    /// Per-filter bias stored as 1D [out_channels]
    bias: Tensor,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
}

impl Conv2d {
    /// Create a layer with freshly initialized parameters
    ///
    /// # Arguments
    /// * `in_channels` - Channels per input image
    /// * `out_channels` - Number of filters
    /// * `kernel` - Filter side length
    /// * `rng` - Source for the uniform fan-in initialization
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize, rng: &mut StdRng) -> Self {
        let fan_in = in_channels * kernel * kernel;
        let bound = 1.0 / (fan_in as f32).sqrt();

        Self {
            weight: uniform(rng, out_channels * fan_in, bound),
            bias: uniform(rng, out_channels, bound),
            in_channels,
            out_channels,
            kernel,
        }
    }

    /// Rebuild a layer from checkpointed parameters
    pub fn from_parameters(
        weight: Tensor,
        bias: Tensor,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
    ) -> Result<Self> {
        if weight.len() != out_channels * in_channels * kernel * kernel {
            return Err(Error::ShapeMismatch {
                expected: vec![out_channels, in_channels, kernel, kernel],
                got: vec![weight.len()],
            });
        }
        if bias.len() != out_channels {
            return Err(Error::ShapeMismatch {
                expected: vec![out_channels],
                got: vec![bias.len()],
            });
        }

        Ok(Self {
            weight,
            bias,
            in_channels,
            out_channels,
            kernel,
        })
    }

    /// Convolve a batch of feature maps
    ///
    /// Output is the valid region only: each spatial side shrinks by
    /// `kernel - 1`.
    pub fn forward(&self, input: &Tensor, batch: usize, height: usize, width: usize) -> Tensor {
        conv2d(
            input,
            &self.weight,
            &self.bias,
            batch,
            self.in_channels,
            height,
            width,
            self.out_channels,
            self.kernel,
        )
    }

    /// Get reference to the filter weights
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Get reference to the bias
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Get the trainable parameters (weight, then bias)
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }
}

/// Fully connected layer: y = x·Wᵀ + b
pub struct Linear {
    /// Weight matrix stored as 1D [out_features * in_features], row-major
    weight: Tensor,
    /// Bias stored as 1D [out_features]
    bias: Tensor,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a layer with freshly initialized parameters
    pub fn new(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (in_features as f32).sqrt();

        Self {
            weight: uniform(rng, out_features * in_features, bound),
            bias: uniform(rng, out_features, bound),
            in_features,
            out_features,
        }
    }

    /// Rebuild a layer from checkpointed parameters
    pub fn from_parameters(
        weight: Tensor,
        bias: Tensor,
        in_features: usize,
        out_features: usize,
    ) -> Result<Self> {
        if weight.len() != out_features * in_features {
            return Err(Error::ShapeMismatch {
                expected: vec![out_features, in_features],
                got: vec![weight.len()],
            });
        }
        if bias.len() != out_features {
            return Err(Error::ShapeMismatch {
                expected: vec![out_features],
                got: vec![bias.len()],
            });
        }

        Ok(Self {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    /// Apply the affine map to a batch of row vectors
    pub fn forward(&self, input: &Tensor, batch: usize) -> Tensor {
        linear(
            input,
            &self.weight,
            &self.bias,
            batch,
            self.in_features,
            self.out_features,
        )
    }

    /// Get reference to the weight matrix
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Get reference to the bias
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Get the trainable parameters (weight, then bias)
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }
}
