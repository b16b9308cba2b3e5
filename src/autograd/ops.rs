//! Autograd operations with backward passes
//!
//! All operations work on flattened buffers with explicit dimensions
//! passed as arguments; layouts are row-major (batch, channel, row, col).

use super::{BackwardOp, Context, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let a_clone = a.clone();
        let backward_op = Rc::new(ReluBackward {
            a: a_clone,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ReluBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ReluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * (a > 0)
                let grad_a = grad * &self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// 2D convolution (valid padding, stride 1)
///
/// Computes a cross-correlation of a batch of multi-channel images with
/// a filter bank, adding a per-output-channel bias. Output spatial size
/// is (height - kernel + 1) × (width - kernel + 1).
///
/// # Arguments
/// * `input` - Images, batch × in_channels × height × width (flattened)
/// * `weight` - Filters, out_channels × in_channels × kernel × kernel (flattened)
/// * `bias` - Per-output-channel bias, out_channels
/// * `batch` - Number of images
/// * `in_channels` - Input channels
/// * `height` - Input rows
/// * `width` - Input columns
/// * `out_channels` - Output channels (filter count)
/// * `kernel` - Filter side length
#[allow(clippy::too_many_arguments)]
pub fn conv2d(
    input: &Tensor,
    weight: &Tensor,
    bias: &Tensor,
    batch: usize,
    in_channels: usize,
    height: usize,
    width: usize,
    out_channels: usize,
    kernel: usize,
) -> Tensor {
    assert_eq!(
        input.len(),
        batch * in_channels * height * width,
        "conv2d input size mismatch"
    );
    assert_eq!(
        weight.len(),
        out_channels * in_channels * kernel * kernel,
        "conv2d weight size mismatch"
    );
    assert_eq!(bias.len(), out_channels, "conv2d bias size mismatch");
    assert!(
        kernel <= height && kernel <= width,
        "conv2d kernel larger than input"
    );

    let out_h = height - kernel + 1;
    let out_w = width - kernel + 1;

    let x = input.data();
    let w = weight.data();
    let b = bias.data();

    let mut out = vec![0.0; batch * out_channels * out_h * out_w];
    for n in 0..batch {
        for oc in 0..out_channels {
            for i in 0..out_h {
                for j in 0..out_w {
                    let mut acc = b[oc];
                    for ic in 0..in_channels {
                        for ki in 0..kernel {
                            for kj in 0..kernel {
                                let x_idx = ((n * in_channels + ic) * height + i + ki) * width
                                    + (j + kj);
                                let w_idx = ((oc * in_channels + ic) * kernel + ki) * kernel + kj;
                                acc += x[x_idx] * w[w_idx];
                            }
                        }
                    }
                    out[((n * out_channels + oc) * out_h + i) * out_w + j] = acc;
                }
            }
        }
    }

    let requires_grad = input.requires_grad() || weight.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(Conv2dBackward {
            input: input.clone(),
            weight: weight.clone(),
            bias: bias.clone(),
            batch,
            in_channels,
            height,
            width,
            out_channels,
            kernel,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct Conv2dBackward {
    input: Tensor,
    weight: Tensor,
    bias: Tensor,
    batch: usize,
    in_channels: usize,
    height: usize,
    width: usize,
    out_channels: usize,
    kernel: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for Conv2dBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let out_h = self.height - self.kernel + 1;
            let out_w = self.width - self.kernel + 1;

            let x = self.input.data();
            let w = self.weight.data();

            // ∂L/∂x[n,ic,i+ki,j+kj] += ∂L/∂out[n,oc,i,j] * w[oc,ic,ki,kj]
            if self.input.requires_grad() {
                let mut grad_x = vec![0.0; x.len()];
                for n in 0..self.batch {
                    for oc in 0..self.out_channels {
                        for i in 0..out_h {
                            for j in 0..out_w {
                                let g = grad_output
                                    [((n * self.out_channels + oc) * out_h + i) * out_w + j];
                                for ic in 0..self.in_channels {
                                    for ki in 0..self.kernel {
                                        for kj in 0..self.kernel {
                                            let x_idx = ((n * self.in_channels + ic) * self.height
                                                + i
                                                + ki)
                                                * self.width
                                                + (j + kj);
                                            let w_idx = ((oc * self.in_channels + ic)
                                                * self.kernel
                                                + ki)
                                                * self.kernel
                                                + kj;
                                            grad_x[x_idx] += g * w[w_idx];
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                self.input.accumulate_grad(Array1::from(grad_x));
            }

            // ∂L/∂w[oc,ic,ki,kj] = Σ_n Σ_i Σ_j ∂L/∂out[n,oc,i,j] * x[n,ic,i+ki,j+kj]
            if self.weight.requires_grad() {
                let mut grad_w = vec![0.0; w.len()];
                for n in 0..self.batch {
                    for oc in 0..self.out_channels {
                        for i in 0..out_h {
                            for j in 0..out_w {
                                let g = grad_output
                                    [((n * self.out_channels + oc) * out_h + i) * out_w + j];
                                for ic in 0..self.in_channels {
                                    for ki in 0..self.kernel {
                                        for kj in 0..self.kernel {
                                            let x_idx = ((n * self.in_channels + ic) * self.height
                                                + i
                                                + ki)
                                                * self.width
                                                + (j + kj);
                                            let w_idx = ((oc * self.in_channels + ic)
                                                * self.kernel
                                                + ki)
                                                * self.kernel
                                                + kj;
                                            grad_w[w_idx] += g * x[x_idx];
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                self.weight.accumulate_grad(Array1::from(grad_w));
            }

            // ∂L/∂b[oc] = Σ_n Σ_i Σ_j ∂L/∂out[n,oc,i,j]
            if self.bias.requires_grad() {
                let mut grad_b = vec![0.0; self.out_channels];
                for n in 0..self.batch {
                    for oc in 0..self.out_channels {
                        for i in 0..out_h {
                            for j in 0..out_w {
                                grad_b[oc] += grad_output
                                    [((n * self.out_channels + oc) * out_h + i) * out_w + j];
                            }
                        }
                    }
                }
                self.bias.accumulate_grad(Array1::from(grad_b));
            }

            // Recursively call backward on inputs
            if let Some(op) = self.input.backward_op() {
                op.backward();
            }
            if let Some(op) = self.weight.backward_op() {
                op.backward();
            }
            if let Some(op) = self.bias.backward_op() {
                op.backward();
            }
        }
    }
}

/// 2×2 max pooling with stride 2
///
/// Rows and columns that do not fill a full window are dropped. The
/// argmax position of each window is memoized for the backward pass.
pub fn max_pool2d(
    input: &Tensor,
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
) -> Tensor {
    assert_eq!(
        input.len(),
        batch * channels * height * width,
        "max_pool2d input size mismatch"
    );

    let out_h = height / 2;
    let out_w = width / 2;

    let x = input.data();
    let mut out = vec![0.0; batch * channels * out_h * out_w];
    let mut argmax = vec![0usize; out.len()];

    for n in 0..batch {
        for c in 0..channels {
            for i in 0..out_h {
                for j in 0..out_w {
                    let mut best_idx =
                        ((n * channels + c) * height + 2 * i) * width + 2 * j;
                    let mut best = x[best_idx];
                    for di in 0..2 {
                        for dj in 0..2 {
                            let idx = ((n * channels + c) * height + 2 * i + di) * width
                                + 2 * j
                                + dj;
                            if x[idx] > best {
                                best = x[idx];
                                best_idx = idx;
                            }
                        }
                    }
                    let out_idx = ((n * channels + c) * out_h + i) * out_w + j;
                    out[out_idx] = best;
                    argmax[out_idx] = best_idx;
                }
            }
        }
    }

    let requires_grad = input.requires_grad();
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MaxPool2dBackward {
            input: input.clone(),
            argmax,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MaxPool2dBackward {
    input: Tensor,
    argmax: Vec<usize>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MaxPool2dBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.input.requires_grad() {
                // ∂L/∂x routes each output gradient to its argmax position
                let mut grad_x = vec![0.0; self.input.len()];
                for (out_idx, &in_idx) in self.argmax.iter().enumerate() {
                    grad_x[in_idx] += grad_output[out_idx];
                }
                self.input.accumulate_grad(Array1::from(grad_x));
            }

            if let Some(op) = self.input.backward_op() {
                op.backward();
            }
        }
    }
}

/// Fully-connected layer: out = x @ W^T + b
///
/// # Arguments
/// * `input` - Activations, batch × in_features (flattened)
/// * `weight` - Weight matrix, out_features × in_features (flattened)
/// * `bias` - Bias, out_features
/// * `batch` - Number of rows in the input
/// * `in_features` - Input width
/// * `out_features` - Output width
pub fn linear(
    input: &Tensor,
    weight: &Tensor,
    bias: &Tensor,
    batch: usize,
    in_features: usize,
    out_features: usize,
) -> Tensor {
    assert_eq!(
        input.len(),
        batch * in_features,
        "linear input size mismatch"
    );
    assert_eq!(
        weight.len(),
        out_features * in_features,
        "linear weight size mismatch"
    );
    assert_eq!(bias.len(), out_features, "linear bias size mismatch");

    let x = input.data();
    let w = weight.data();
    let b = bias.data();

    let mut out = vec![0.0; batch * out_features];
    for n in 0..batch {
        for o in 0..out_features {
            let mut acc = b[o];
            for i in 0..in_features {
                acc += x[n * in_features + i] * w[o * in_features + i];
            }
            out[n * out_features + o] = acc;
        }
    }

    let requires_grad = input.requires_grad() || weight.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LinearBackward {
            input: input.clone(),
            weight: weight.clone(),
            bias: bias.clone(),
            batch,
            in_features,
            out_features,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LinearBackward {
    input: Tensor,
    weight: Tensor,
    bias: Tensor,
    batch: usize,
    in_features: usize,
    out_features: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LinearBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let x = self.input.data();
            let w = self.weight.data();

            // ∂L/∂x[n,i] = Σ_o ∂L/∂out[n,o] * w[o,i]
            if self.input.requires_grad() {
                let mut grad_x = vec![0.0; self.batch * self.in_features];
                for n in 0..self.batch {
                    for i in 0..self.in_features {
                        let mut acc = 0.0;
                        for o in 0..self.out_features {
                            acc += grad_output[n * self.out_features + o]
                                * w[o * self.in_features + i];
                        }
                        grad_x[n * self.in_features + i] = acc;
                    }
                }
                self.input.accumulate_grad(Array1::from(grad_x));
            }

            // ∂L/∂w[o,i] = Σ_n ∂L/∂out[n,o] * x[n,i]
            if self.weight.requires_grad() {
                let mut grad_w = vec![0.0; self.out_features * self.in_features];
                for o in 0..self.out_features {
                    for i in 0..self.in_features {
                        let mut acc = 0.0;
                        for n in 0..self.batch {
                            acc += grad_output[n * self.out_features + o]
                                * x[n * self.in_features + i];
                        }
                        grad_w[o * self.in_features + i] = acc;
                    }
                }
                self.weight.accumulate_grad(Array1::from(grad_w));
            }

            // ∂L/∂b[o] = Σ_n ∂L/∂out[n,o]
            if self.bias.requires_grad() {
                let mut grad_b = vec![0.0; self.out_features];
                for n in 0..self.batch {
                    for o in 0..self.out_features {
                        grad_b[o] += grad_output[n * self.out_features + o];
                    }
                }
                self.bias.accumulate_grad(Array1::from(grad_b));
            }

            // Recursively call backward on inputs
            if let Some(op) = self.input.backward_op() {
                op.backward();
            }
            if let Some(op) = self.weight.backward_op() {
                op.backward();
            }
            if let Some(op) = self.bias.backward_op() {
                op.backward();
            }
        }
    }
}

/// Inverted dropout
///
/// In training mode each element is zeroed with probability `p` and the
/// survivors are scaled by 1/(1-p); in evaluation mode the input passes
/// through unchanged. Masks draw from the context's random stream.
pub fn dropout(a: &Tensor, p: f32, ctx: &Context) -> Tensor {
    assert!((0.0..1.0).contains(&p), "dropout probability must be in [0, 1)");

    if !ctx.is_training() {
        return a.clone();
    }

    let keep_scale = 1.0 / (1.0 - p);
    let mask: Vec<f32> = {
        let mut rng = ctx.rng();
        use rand::Rng;
        (0..a.len())
            .map(|_| if rng.random::<f32>() < p { 0.0 } else { keep_scale })
            .collect()
    };
    let mask = Array1::from(mask);

    let data = a.data() * &mask;
    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DropoutBackward {
            a: a.clone(),
            mask,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// Channel-wise dropout for convolutional feature maps
///
/// Zeroes entire channels per sample with probability `p` (scaling the
/// kept channels by 1/(1-p)), rather than individual elements.
pub fn dropout2d(
    a: &Tensor,
    p: f32,
    ctx: &Context,
    batch: usize,
    channels: usize,
    plane: usize,
) -> Tensor {
    assert!((0.0..1.0).contains(&p), "dropout probability must be in [0, 1)");
    assert_eq!(
        a.len(),
        batch * channels * plane,
        "dropout2d input size mismatch"
    );

    if !ctx.is_training() {
        return a.clone();
    }

    let keep_scale = 1.0 / (1.0 - p);
    let mut mask = vec![0.0; a.len()];
    {
        let mut rng = ctx.rng();
        use rand::Rng;
        for n in 0..batch {
            for c in 0..channels {
                let keep = if rng.random::<f32>() < p { 0.0 } else { keep_scale };
                let start = (n * channels + c) * plane;
                mask[start..start + plane].fill(keep);
            }
        }
    }
    let mask = Array1::from(mask);

    let data = a.data() * &mask;
    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DropoutBackward {
            a: a.clone(),
            mask,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct DropoutBackward {
    a: Tensor,
    mask: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for DropoutBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * mask (same zeros, same scale)
                let grad_a = grad * &self.mask;
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Row-wise log-softmax
///
/// Computes y[n,i] = x[n,i] - max_j(x[n,j]) - ln Σ_j exp(x[n,j] - max),
/// the numerically stable form, independently for each of `batch` rows
/// of `classes` scores.
pub fn log_softmax(a: &Tensor, batch: usize, classes: usize) -> Tensor {
    assert_eq!(
        a.len(),
        batch * classes,
        "log_softmax input size mismatch"
    );

    let x = a.data();
    let mut out = vec![0.0; batch * classes];
    for n in 0..batch {
        let mut max_val = f32::NEG_INFINITY;
        for i in 0..classes {
            max_val = max_val.max(x[n * classes + i]);
        }
        let mut sum_exp = 0.0;
        for i in 0..classes {
            sum_exp += (x[n * classes + i] - max_val).exp();
        }
        let log_sum = sum_exp.ln();
        for i in 0..classes {
            out[n * classes + i] = x[n * classes + i] - max_val - log_sum;
        }
    }

    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let output_clone = result.clone();
        let backward_op = Rc::new(LogSoftmaxBackward {
            a: a.clone(),
            output: output_clone,
            batch,
            classes,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LogSoftmaxBackward {
    a: Tensor,
    output: Tensor,
    batch: usize,
    classes: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LogSoftmaxBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂x[n,i] = ∂L/∂y[n,i] - exp(y[n,i]) * Σ_j ∂L/∂y[n,j]
                let y = self.output.data();
                let mut grad_a = vec![0.0; self.batch * self.classes];
                for n in 0..self.batch {
                    let mut row_sum = 0.0;
                    for j in 0..self.classes {
                        row_sum += grad_output[n * self.classes + j];
                    }
                    for i in 0..self.classes {
                        let idx = n * self.classes + i;
                        grad_a[idx] = grad_output[idx] - y[idx].exp() * row_sum;
                    }
                }
                self.a.accumulate_grad(Array1::from(grad_a));
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}
