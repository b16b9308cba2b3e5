//! High-level training loop
//!
//! This module provides a complete training framework with:
//! - Negative log-likelihood loss over log-probabilities
//! - Trainer abstraction driving replicated models in lockstep
//! - Training configuration
//! - Metrics tracking
//!
//! # Example
//!
//! ```no_run
//! use cifra::train::{NllLoss, TrainConfig, Trainer};
//! use cifra::optim::{Optimizer, SGD};
//! use cifra::nn::Net;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let config = TrainConfig::default();
//! let mut rng = StdRng::seed_from_u64(config.seed);
//! let replicas = vec![Net::new(&mut rng)];
//! let optimizers: Vec<Box<dyn Optimizer>> =
//!     vec![Box::new(SGD::new(config.lr, config.momentum))];
//!
//! let mut trainer = Trainer::new(replicas, optimizers, 0, config);
//! trainer.set_loss(Box::new(NllLoss::mean()));
//!
//! // Training loop
//! // for epoch in 1..=config.epochs {
//! //     let loss = trainer.train_epoch(epoch, &mut loaders, &mut ctx)?;
//! //     println!("Epoch {}: loss={:.4}", epoch, loss);
//! // }
//! ```

mod batch;
mod config;
mod loss;
mod trainer;

pub use batch::Batch;
pub use config::{MetricsTracker, TrainConfig};
pub use loss::{LossFn, NllLoss, Reduction};
pub use trainer::Trainer;
