//! CLI argument parsing and validation
//!
//! This module provides the command-line interface for the training
//! entrypoint. Deployment details follow the SageMaker container
//! contract: each one can arrive as an `SM_*` environment variable,
//! and explicit flags override the environment.
//!
//! # Usage
//!
//! ```bash
//! cifra --model-dir ./model --data-dir ./data
//! cifra --epochs 5 --model-dir ./model --data-dir ./data
//! SM_HOSTS='["algo-1","algo-2"]' SM_CURRENT_HOST=algo-2 cifra ...
//! ```

use crate::train::TrainConfig;
use clap::Parser;
use std::path::PathBuf;

/// Cifra: convolutional MNIST digit classifier trainer
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "cifra")]
#[command(version)]
#[command(about = "Train a convolutional MNIST digit classifier")]
pub struct Cli {
    /// Number of training epochs
    #[arg(long, default_value_t = 1)]
    pub epochs: usize,

    /// JSON list of hosts participating in the job
    #[arg(long, env = "SM_HOSTS", default_value = r#"["algo-1"]"#)]
    pub hosts: String,

    /// Name of the host running this process
    #[arg(long, env = "SM_CURRENT_HOST", default_value = "algo-1")]
    pub current_host: String,

    /// Directory the final model snapshot is written to
    #[arg(long, env = "SM_MODEL_DIR")]
    pub model_dir: PathBuf,

    /// Directory holding the MNIST IDX files
    #[arg(long, env = "SM_CHANNEL_TRAINING")]
    pub data_dir: PathBuf,

    /// GPUs visible to the container (informational; training runs on CPU)
    #[arg(long, env = "SM_NUM_GPUS", default_value_t = 0)]
    pub num_gpus: usize,

    /// CPUs visible to the container (informational)
    #[arg(long, env = "SM_NUM_CPUS", default_value_t = 0)]
    pub num_cpus: usize,
}

impl Cli {
    /// Parse the JSON host list
    pub fn host_list(&self) -> crate::Result<Vec<String>> {
        serde_json::from_str(&self.hosts).map_err(|e| {
            crate::Error::ConfigError(format!("invalid host list {:?}: {e}", self.hosts))
        })
    }

    /// Build the training configuration these arguments describe
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig::new().with_epochs(self.epochs)
    }
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}
