//! Mini-batch container

use crate::Tensor;

/// One mini-batch of inputs and matching targets
///
/// Inputs hold the flattened images back to back; targets hold one
/// class index per image, stored as `f32` for the loss layer.
pub struct Batch {
    /// Input features, `len × feature_width` flattened
    pub inputs: Tensor,
    /// One target per sample
    pub targets: Tensor,
}

impl Batch {
    /// Create a batch from prepared tensors
    pub fn new(inputs: Tensor, targets: Tensor) -> Self {
        Self { inputs, targets }
    }

    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
