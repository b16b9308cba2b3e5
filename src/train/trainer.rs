//! Trainer abstraction for the replicated training loop

use super::{Batch, LossFn, MetricsTracker, NllLoss, TrainConfig};
use crate::autograd::Context;
use crate::data::{Batches, DataLoader};
use crate::dist;
use crate::nn::Net;
use crate::optim::Optimizer;
use crate::{Result, Tensor};

/// High-level trainer that orchestrates the training loop
///
/// Holds one model replica per configured host and drives them in
/// lockstep: every step each replica consumes one batch from its own
/// shard, gradients are averaged across replicas, and every optimizer
/// applies the same update. Replicas therefore hold bit-identical
/// parameters for the whole run. Progress is logged for `rank` only.
pub struct Trainer {
    /// Model replicas, one per host
    replicas: Vec<Net>,

    /// One optimizer per replica
    optimizers: Vec<Box<dyn Optimizer>>,

    /// Loss function
    loss_fn: Option<Box<dyn LossFn>>,

    /// Training configuration
    config: TrainConfig,

    /// Metrics tracker
    pub metrics: MetricsTracker,

    /// The replica this host reports and saves
    rank: usize,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(
        replicas: Vec<Net>,
        optimizers: Vec<Box<dyn Optimizer>>,
        rank: usize,
        config: TrainConfig,
    ) -> Self {
        assert!(!replicas.is_empty(), "at least one replica is required");
        assert_eq!(
            replicas.len(),
            optimizers.len(),
            "one optimizer per replica"
        );
        assert!(rank < replicas.len(), "rank out of range");

        Self {
            replicas,
            optimizers,
            loss_fn: None,
            config,
            metrics: MetricsTracker::new(),
            rank,
        }
    }

    /// Set the loss function
    pub fn set_loss(&mut self, loss_fn: Box<dyn LossFn>) {
        self.loss_fn = Some(loss_fn);
    }

    /// Get current learning rate
    pub fn lr(&self) -> f32 {
        self.optimizers[self.rank].lr()
    }

    /// Set learning rate on every replica's optimizer
    pub fn set_lr(&mut self, lr: f32) {
        for optimizer in &mut self.optimizers {
            optimizer.set_lr(lr);
        }
    }

    /// This host's replica
    pub fn net(&self) -> &Net {
        &self.replicas[self.rank]
    }

    /// All replicas, in rank order
    pub fn replicas(&self) -> &[Net] {
        &self.replicas
    }

    /// Number of replicas being driven
    pub fn world_size(&self) -> usize {
        self.replicas.len()
    }

    /// Train for one epoch
    ///
    /// Expects one loader per replica, all sharing the same dataset.
    /// Reseeds every loader with the epoch number first, so distributed
    /// shards reshuffle between epochs.
    ///
    /// # Returns
    ///
    /// Average loss over this rank's shard
    pub fn train_epoch(
        &mut self,
        epoch: usize,
        loaders: &mut [DataLoader<'_>],
        ctx: &mut Context,
    ) -> Result<f32> {
        assert!(
            self.loss_fn.is_some(),
            "Loss function must be set before training"
        );
        assert_eq!(
            loaders.len(),
            self.replicas.len(),
            "one loader per replica"
        );

        ctx.train();
        for loader in loaders.iter_mut() {
            loader.set_epoch(epoch);
        }

        let shard_len = loaders[self.rank].sample_count();
        let num_batches = loaders[self.rank].num_batches();
        let distributed = self.replicas.len() > 1;

        let mut streams: Vec<Batches<'_>> = loaders.iter_mut().map(|l| l.iter()).collect();

        let mut total_loss = 0.0;
        let mut batches_done = 0usize;
        let mut batch_idx = 0usize;

        loop {
            let batches: Vec<Batch> = streams.iter_mut().map_while(|s| s.next()).collect();
            if batches.len() < self.replicas.len() {
                break;
            }
            batch_idx += 1;

            let mut step_loss = 0.0;
            for (i, batch) in batches.iter().enumerate() {
                self.replicas[i].zero_grad();

                let predictions = self.replicas[i].forward(&batch.inputs, batch.len(), ctx);
                let loss = self
                    .loss_fn
                    .as_ref()
                    .unwrap()
                    .forward(&predictions, &batch.targets);
                if i == self.rank {
                    step_loss = loss.item();
                }

                if let Some(backward_op) = loss.backward_op() {
                    backward_op.backward();
                }
            }

            if distributed {
                dist::average_gradients(&self.replicas)?;
            }

            for (replica, optimizer) in self.replicas.iter_mut().zip(self.optimizers.iter_mut()) {
                let mut params = replica.parameters_mut();
                optimizer.step(&mut params);
            }

            total_loss += step_loss;
            batches_done += 1;
            self.metrics.increment_step();

            if batch_idx % self.config.log_interval == 0 {
                println!(
                    "Train Epoch: {} [{}/{} ({:.0}%)] Loss: {:.6}",
                    epoch,
                    batch_idx * batches[self.rank].len(),
                    shard_len,
                    100.0 * batch_idx as f32 / num_batches as f32,
                    step_loss
                );
            }
        }

        let avg_loss = if batches_done > 0 {
            total_loss / batches_done as f32
        } else {
            0.0
        };

        // Record epoch metrics
        self.metrics.record_epoch(avg_loss, self.lr());

        Ok(avg_loss)
    }

    /// Evaluate this rank's replica on the test set
    ///
    /// Uses sum-reduction NLL over every batch and argmax predictions,
    /// then averages over the whole set.
    ///
    /// # Returns
    ///
    /// `(average_loss, accuracy)`
    pub fn evaluate(&mut self, loader: &mut DataLoader<'_>, ctx: &mut Context) -> (f32, f32) {
        ctx.eval();

        let net = &self.replicas[self.rank];
        let loss_fn = NllLoss::sum();
        let total = loader.sample_count();

        let mut total_loss = 0.0;
        let mut correct = 0usize;
        for batch in loader.iter() {
            let predictions = net.forward(&batch.inputs, batch.len(), ctx);
            total_loss += loss_fn.forward(&predictions, &batch.targets).item();
            correct += count_correct(&predictions, &batch.targets);
        }

        let avg_loss = total_loss / total as f32;
        let accuracy = correct as f32 / total as f32;
        println!(
            "Test set: Average loss: {:.4}, Accuracy: {}/{} ({:.0}%)\n",
            avg_loss,
            correct,
            total,
            100.0 * accuracy
        );

        self.metrics.record_eval(avg_loss, accuracy);
        (avg_loss, accuracy)
    }

    /// Run the full schedule: train each epoch, then evaluate
    pub fn train(
        &mut self,
        train_loaders: &mut [DataLoader<'_>],
        test_loader: &mut DataLoader<'_>,
        ctx: &mut Context,
    ) -> Result<()> {
        for epoch in 1..=self.config.epochs {
            self.train_epoch(epoch, train_loaders, ctx)?;
            self.evaluate(test_loader, ctx);
        }
        Ok(())
    }
}

/// Count rows whose argmax matches the target class
fn count_correct(predictions: &Tensor, targets: &Tensor) -> usize {
    let batch = targets.len();
    if batch == 0 {
        return 0;
    }
    let classes = predictions.len() / batch;

    let mut correct = 0;
    for n in 0..batch {
        let mut best = 0;
        for c in 1..classes {
            if predictions.data()[n * classes + c] > predictions.data()[n * classes + best] {
                best = c;
            }
        }
        if best == targets.data()[n] as usize {
            correct += 1;
        }
    }
    correct
}
