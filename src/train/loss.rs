//! Loss functions for training

use crate::Tensor;
use ndarray::Array1;

/// Trait for loss functions
pub trait LossFn {
    /// Compute loss given predictions and targets
    ///
    /// Returns a scalar loss value and sets up gradients for backpropagation
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor;

    /// Name of the loss function
    fn name(&self) -> &str;
}

/// How per-sample losses collapse to a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Mean,
    Sum,
}

/// Negative log-likelihood loss over log-probabilities
///
/// Predictions are `batch × classes` rows of log-probabilities (the
/// log-softmax output); targets are one class index per row, stored as
/// `f32`. The loss picks each row's true-class log-probability and
/// negates it.
///
/// # Example
///
/// ```
/// use cifra::train::{LossFn, NllLoss};
/// use cifra::Tensor;
///
/// let loss_fn = NllLoss::mean();
/// let pred = Tensor::from_vec(vec![-0.1, -2.5, -1.9, -0.2], true);
/// let target = Tensor::from_vec(vec![0.0, 1.0], false);
///
/// let loss = loss_fn.forward(&pred, &target);
/// assert!(loss.data()[0] > 0.0);
/// ```
pub struct NllLoss {
    reduction: Reduction,
}

impl NllLoss {
    /// Average the per-sample losses (the training reduction)
    pub fn mean() -> Self {
        Self {
            reduction: Reduction::Mean,
        }
    }

    /// Sum the per-sample losses (the evaluation reduction)
    pub fn sum() -> Self {
        Self {
            reduction: Reduction::Sum,
        }
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }
}

impl LossFn for NllLoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        let batch = targets.len();
        assert!(batch > 0, "targets must not be empty");
        assert_eq!(
            predictions.len() % batch,
            0,
            "predictions are not a whole number of class rows"
        );
        let classes = predictions.len() / batch;

        let scale = match self.reduction {
            Reduction::Mean => 1.0 / batch as f32,
            Reduction::Sum => 1.0,
        };

        // Pick each row's true-class log-probability
        let mut picked = 0.0;
        let mut grad: Array1<f32> = Array1::zeros(predictions.len());
        for n in 0..batch {
            let class = targets.data()[n] as usize;
            assert!(
                class < classes,
                "target class {class} out of range for {classes} classes"
            );
            picked += predictions.data()[n * classes + class];
            // ∂L/∂logp[n, class] = -scale
            grad[n * classes + class] = -scale;
        }

        let mut loss = Tensor::from_vec(vec![-picked * scale], true);

        use crate::autograd::BackwardOp;
        use std::rc::Rc;

        struct NllBackward {
            predictions: Tensor,
            grad: Array1<f32>,
        }

        impl BackwardOp for NllBackward {
            fn backward(&self) {
                // Seed the prediction gradient, then walk the rest of the graph
                self.predictions.accumulate_grad(self.grad.clone());
                if let Some(op) = self.predictions.backward_op() {
                    op.backward();
                }
            }
        }

        if predictions.requires_grad() {
            loss.set_backward_op(Rc::new(NllBackward {
                predictions: predictions.clone(),
                grad,
            }));
        }

        loss
    }

    fn name(&self) -> &str {
        "NLL"
    }
}
