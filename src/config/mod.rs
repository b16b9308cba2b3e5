//! Training job configuration
//!
//! Command-line arguments and the SageMaker environment contract that
//! backs them. Hyperparameters the entrypoint does not expose stay at
//! their fixed defaults in [`crate::train::TrainConfig`].

mod cli;

pub use cli::{parse_args, Cli};
