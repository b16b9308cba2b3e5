//! The convolutional digit classifier
//!
//! Fixed architecture over 28×28 single-channel images:
//!
//! ```text
//! conv1 (1→10, 5×5) → max pool 2×2 → relu
//! conv2 (10→20, 5×5) → channel dropout → max pool 2×2 → relu
//! flatten (320) → fc1 (320→50) → relu → dropout → fc2 (50→10) → log-softmax
//! ```
//!
//! The forward pass produces log-probabilities, one row of ten per image.

use crate::autograd::{dropout, dropout2d, log_softmax, max_pool2d, relu, Context, Tensor};
use crate::io::{Model, ModelMetadata, ModelParameter};
use crate::nn::layers::{Conv2d, Linear};
use crate::{Error, Result};
use rand::rngs::StdRng;

/// Number of digit classes
pub const NUM_CLASSES: usize = 10;

/// Flattened feature width after the convolutional stack (20 × 4 × 4)
const FLATTENED: usize = 320;

/// Drop probability for both dropout stages
const DROPOUT_P: f32 = 0.5;

/// Canonical parameter names and shapes, in forward order
pub const PARAMETER_SHAPES: [(&str, &[usize]); 8] = [
    ("conv1.weight", &[10, 1, 5, 5]),
    ("conv1.bias", &[10]),
    ("conv2.weight", &[20, 10, 5, 5]),
    ("conv2.bias", &[20]),
    ("fc1.weight", &[50, FLATTENED]),
    ("fc1.bias", &[50]),
    ("fc2.weight", &[NUM_CLASSES, 50]),
    ("fc2.bias", &[NUM_CLASSES]),
];

/// Two-stage convolutional classifier
pub struct Net {
    conv1: Conv2d,
    conv2: Conv2d,
    fc1: Linear,
    fc2: Linear,
}

impl Net {
    /// Create a network with freshly initialized parameters
    ///
    /// Layers draw from `rng` in declaration order, so two networks
    /// built from identically seeded generators are identical.
    pub fn new(rng: &mut StdRng) -> Self {
        Self {
            conv1: Conv2d::new(1, 10, 5, rng),
            conv2: Conv2d::new(10, 20, 5, rng),
            fc1: Linear::new(FLATTENED, 50, rng),
            fc2: Linear::new(50, NUM_CLASSES, rng),
        }
    }

    /// Forward pass over a batch of flattened 28×28 images
    ///
    /// `ctx` carries the train/eval mode and the dropout noise source.
    /// Returns log-probabilities, `batch × 10`.
    pub fn forward(&self, images: &Tensor, batch: usize, ctx: &Context) -> Tensor {
        let x = self.conv1.forward(images, batch, 28, 28); // batch×10×24×24
        let x = max_pool2d(&x, batch, 10, 24, 24); // batch×10×12×12
        let x = relu(&x);

        let x = self.conv2.forward(&x, batch, 12, 12); // batch×20×8×8
        let x = dropout2d(&x, DROPOUT_P, ctx, batch, 20, 8 * 8);
        let x = max_pool2d(&x, batch, 20, 8, 8); // batch×20×4×4
        let x = relu(&x);

        // Flat row-major buffers make the reshape to batch×320 a no-op
        let x = self.fc1.forward(&x, batch);
        let x = relu(&x);
        let x = dropout(&x, DROPOUT_P, ctx);
        let x = self.fc2.forward(&x, batch);

        log_softmax(&x, batch, NUM_CLASSES)
    }

    /// Named parameters in canonical order
    pub fn parameters(&self) -> Vec<(&'static str, &Tensor)> {
        vec![
            ("conv1.weight", self.conv1.weight()),
            ("conv1.bias", self.conv1.bias()),
            ("conv2.weight", self.conv2.weight()),
            ("conv2.bias", self.conv2.bias()),
            ("fc1.weight", self.fc1.weight()),
            ("fc1.bias", self.fc1.bias()),
            ("fc2.weight", self.fc2.weight()),
            ("fc2.bias", self.fc2.bias()),
        ]
    }

    /// Mutable parameters in canonical order, for the optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.conv1.parameters_mut();
        params.extend(self.conv2.parameters_mut());
        params.extend(self.fc1.parameters_mut());
        params.extend(self.fc2.parameters_mut());
        params
    }

    /// Total number of trainable scalars
    pub fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|(_, t)| t.len()).sum()
    }

    /// Clear accumulated gradients on every parameter
    pub fn zero_grad(&self) {
        for (_, param) in self.parameters() {
            param.zero_grad();
        }
    }

    /// Package the current parameters as a named checkpoint
    pub fn to_model(&self, name: impl Into<String>) -> Model {
        let parameters = self
            .parameters()
            .into_iter()
            .zip(PARAMETER_SHAPES)
            .map(|((name, tensor), (_, shape))| ModelParameter {
                name: name.to_string(),
                shape: shape.to_vec(),
                tensor: tensor.clone(),
            })
            .collect();

        Model::new(ModelMetadata::new(name, "convnet"), parameters)
    }

    /// Rebuild a network from a checkpoint
    ///
    /// Accepts parameter names with or without a leading `module.`
    /// prefix, so snapshots written by replica-wrapped trainers load
    /// unchanged. Loaded tensors are detached copies marked trainable.
    pub fn from_model(model: &Model) -> Result<Self> {
        let conv1 = Conv2d::from_parameters(
            detached_parameter(model, "conv1.weight")?,
            detached_parameter(model, "conv1.bias")?,
            1,
            10,
            5,
        )?;
        let conv2 = Conv2d::from_parameters(
            detached_parameter(model, "conv2.weight")?,
            detached_parameter(model, "conv2.bias")?,
            10,
            20,
            5,
        )?;
        let fc1 = Linear::from_parameters(
            detached_parameter(model, "fc1.weight")?,
            detached_parameter(model, "fc1.bias")?,
            FLATTENED,
            50,
        )?;
        let fc2 = Linear::from_parameters(
            detached_parameter(model, "fc2.weight")?,
            detached_parameter(model, "fc2.bias")?,
            50,
            NUM_CLASSES,
        )?;

        Ok(Self {
            conv1,
            conv2,
            fc1,
            fc2,
        })
    }
}

/// Fetch a named parameter as a fresh trainable tensor
///
/// The recorded shape must match the canonical shape for the name; a
/// snapshot annotated with transposed or otherwise wrong dimensions is
/// rejected even when the element count happens to agree.
fn detached_parameter(model: &Model, name: &str) -> Result<Tensor> {
    let param = model
        .get_parameter(name)
        .ok_or_else(|| Error::InvalidParameter(format!("checkpoint is missing parameter {name}")))?;

    let expected = PARAMETER_SHAPES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, shape)| *shape)
        .expect("looked up by canonical parameter name");
    if param.shape != expected {
        return Err(Error::ShapeMismatch {
            expected: expected.to_vec(),
            got: param.shape.clone(),
        });
    }

    Ok(Tensor::from_vec(param.tensor.data().to_vec(), true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn test_images(batch: usize) -> Tensor {
        let data: Vec<f32> = (0..batch * 28 * 28)
            .map(|i| (i as f32 * 0.013).sin())
            .collect();
        Tensor::from_vec(data, false)
    }

    #[test]
    fn test_forward_output_length() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = Net::new(&mut rng);
        let mut ctx = Context::with_seed(1);
        ctx.eval();

        let out = net.forward(&test_images(3), 3, &ctx);
        assert_eq!(out.len(), 3 * NUM_CLASSES);
    }

    #[test]
    fn test_forward_rows_are_log_probabilities() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = Net::new(&mut rng);
        let mut ctx = Context::with_seed(2);
        ctx.eval();

        let out = net.forward(&test_images(4), 4, &ctx);
        for n in 0..4 {
            let row_sum: f32 = (0..NUM_CLASSES)
                .map(|c| out.data()[n * NUM_CLASSES + c].exp())
                .sum();
            assert_abs_diff_eq!(row_sum, 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_same_seed_builds_identical_networks() {
        let mut rng_a = StdRng::seed_from_u64(9);
        let mut rng_b = StdRng::seed_from_u64(9);
        let a = Net::new(&mut rng_a);
        let b = Net::new(&mut rng_b);

        for ((_, pa), (_, pb)) in a.parameters().iter().zip(b.parameters().iter()) {
            assert_eq!(pa.data(), pb.data());
        }
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        let net = Net::new(&mut rng);
        let mut ctx = Context::with_seed(3);
        ctx.eval();

        let images = test_images(2);
        let first = net.forward(&images, 2, &ctx);
        let second = net.forward(&images, 2, &ctx);
        assert_eq!(first.data(), second.data());
    }

    #[test]
    fn test_parameter_names_and_total_count() {
        let mut rng = StdRng::seed_from_u64(4);
        let net = Net::new(&mut rng);

        let params = net.parameters();
        assert_eq!(params.len(), 8);
        for ((name, tensor), (expected_name, shape)) in params.iter().zip(PARAMETER_SHAPES) {
            assert_eq!(*name, expected_name);
            assert_eq!(tensor.len(), shape.iter().product::<usize>());
        }

        // 250 + 10 + 5000 + 20 + 16000 + 50 + 500 + 10
        assert_eq!(net.num_parameters(), 21840);
    }

    #[test]
    fn test_backward_populates_every_parameter_grad() {
        let mut rng = StdRng::seed_from_u64(5);
        let net = Net::new(&mut rng);
        let ctx = Context::with_seed(5);

        let mut out = net.forward(&test_images(2), 2, &ctx);
        backward(&mut out, None);

        for (name, param) in net.parameters() {
            assert!(param.grad().is_some(), "no gradient for {name}");
        }
    }

    #[test]
    fn test_zero_grad_clears_gradients() {
        let mut rng = StdRng::seed_from_u64(6);
        let net = Net::new(&mut rng);
        let ctx = Context::with_seed(6);

        let mut out = net.forward(&test_images(1), 1, &ctx);
        backward(&mut out, None);
        net.zero_grad();

        for (name, param) in net.parameters() {
            assert!(param.grad().is_none(), "gradient not cleared for {name}");
        }
    }

    #[test]
    fn test_model_round_trip_preserves_outputs() {
        let mut rng = StdRng::seed_from_u64(7);
        let net = Net::new(&mut rng);
        let mut ctx = Context::with_seed(7);
        ctx.eval();

        let images = test_images(2);
        let before = net.forward(&images, 2, &ctx);

        let model = net.to_model("round-trip");
        let restored = Net::from_model(&model).unwrap();
        let after = restored.forward(&images, 2, &ctx);

        assert_eq!(before.data(), after.data());
    }

    #[test]
    fn test_to_model_records_shapes() {
        let mut rng = StdRng::seed_from_u64(8);
        let net = Net::new(&mut rng);
        let model = net.to_model("shapes");

        assert_eq!(model.parameters.len(), 8);
        for (param, (name, shape)) in model.parameters.iter().zip(PARAMETER_SHAPES) {
            assert_eq!(param.name, name);
            assert_eq!(param.shape, shape);
            assert_eq!(param.tensor.len(), shape.iter().product::<usize>());
        }
    }

    #[test]
    fn test_from_model_rejects_missing_parameter() {
        let mut rng = StdRng::seed_from_u64(10);
        let net = Net::new(&mut rng);
        let mut model = net.to_model("incomplete");
        model.parameters.retain(|p| p.name != "fc1.weight");

        assert!(Net::from_model(&model).is_err());
    }

    #[test]
    fn test_from_model_rejects_wrong_shape_annotation() {
        let mut rng = StdRng::seed_from_u64(13);
        let net = Net::new(&mut rng);
        let mut model = net.to_model("transposed");

        // Same element count, transposed dims
        if let Some(param) = model.parameters.iter_mut().find(|p| p.name == "fc1.weight") {
            param.shape = vec![320, 50];
        }

        let result = Net::from_model(&model);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_from_model_rejects_wrong_length() {
        let mut rng = StdRng::seed_from_u64(11);
        let net = Net::new(&mut rng);
        let mut model = net.to_model("truncated");
        if let Some(param) = model.parameters.iter_mut().find(|p| p.name == "fc2.bias") {
            param.tensor = Tensor::zeros(3, false);
        }

        assert!(Net::from_model(&model).is_err());
    }

    #[test]
    fn test_from_model_accepts_wrapped_parameter_names() {
        let mut rng = StdRng::seed_from_u64(12);
        let net = Net::new(&mut rng);
        let mut ctx = Context::with_seed(12);
        ctx.eval();

        let mut model = net.to_model("wrapped");
        for param in &mut model.parameters {
            param.name = format!("module.{}", param.name);
        }

        let images = test_images(1);
        let restored = Net::from_model(&model).unwrap();
        assert_eq!(
            net.forward(&images, 1, &ctx).data(),
            restored.forward(&images, 1, &ctx).data()
        );
    }
}
