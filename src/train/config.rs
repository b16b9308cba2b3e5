//! Training configuration and metrics

use crate::{Error, Result};

/// Training hyperparameters
///
/// Defaults are the values the classifier was tuned with; typically only
/// the epoch count varies between runs.
#[derive(Clone, Debug)]
pub struct TrainConfig {
    /// Number of passes over the training set
    pub epochs: usize,

    /// Training mini-batch size
    pub batch_size: usize,

    /// Evaluation mini-batch size
    pub test_batch_size: usize,

    /// SGD learning rate
    pub lr: f32,

    /// SGD momentum
    pub momentum: f32,

    /// Seed for parameter init, shuffling, and dropout
    pub seed: u64,

    /// Print training progress every N batches
    pub log_interval: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 64,
            test_batch_size: 1000,
            lr: 0.1,
            momentum: 0.5,
            seed: 1,
            log_interval: 100,
        }
    }
}

impl TrainConfig {
    /// Create a new training configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of epochs
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the training batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the logging interval
    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval;
        self
    }

    /// Set the run seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidParameter(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.test_batch_size == 0 {
            return Err(Error::InvalidParameter(
                "test_batch_size must be positive".to_string(),
            ));
        }
        if self.lr <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "lr must be positive, got {}",
                self.lr
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(Error::InvalidParameter(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        if self.log_interval == 0 {
            return Err(Error::InvalidParameter(
                "log_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tracks training metrics across epochs
#[derive(Clone, Debug)]
pub struct MetricsTracker {
    /// Training loss history (one per epoch)
    pub losses: Vec<f32>,

    /// Evaluation loss history (one per epoch)
    pub val_losses: Vec<f32>,

    /// Evaluation accuracy history (fraction correct, one per epoch)
    pub val_accuracies: Vec<f32>,

    /// Learning rates (one per epoch)
    pub learning_rates: Vec<f32>,

    /// Training step count
    pub steps: usize,

    /// Current epoch
    pub epoch: usize,
}

impl MetricsTracker {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            losses: Vec::new(),
            val_losses: Vec::new(),
            val_accuracies: Vec::new(),
            learning_rates: Vec::new(),
            steps: 0,
            epoch: 0,
        }
    }

    /// Record an epoch's training metrics
    pub fn record_epoch(&mut self, loss: f32, lr: f32) {
        self.losses.push(loss);
        self.learning_rates.push(lr);
        self.epoch += 1;
    }

    /// Record an evaluation pass for the current epoch
    pub fn record_eval(&mut self, loss: f32, accuracy: f32) {
        self.val_losses.push(loss);
        self.val_accuracies.push(accuracy);
    }

    /// Increment step counter
    pub fn increment_step(&mut self) {
        self.steps += 1;
    }

    /// Get best (minimum) training loss
    pub fn best_loss(&self) -> Option<f32> {
        self.losses
            .iter()
            .copied()
            .min_by(|a, b| a.partial_cmp(b).unwrap())
    }

    /// Get best (minimum) evaluation loss
    pub fn best_val_loss(&self) -> Option<f32> {
        self.val_losses
            .iter()
            .copied()
            .min_by(|a, b| a.partial_cmp(b).unwrap())
    }

    /// Get best (maximum) evaluation accuracy
    pub fn best_accuracy(&self) -> Option<f32> {
        self.val_accuracies
            .iter()
            .copied()
            .max_by(|a, b| a.partial_cmp(b).unwrap())
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_config_default() {
        let config = TrainConfig::default();
        assert_eq!(config.epochs, 1);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.test_batch_size, 1000);
        assert_eq!(config.lr, 0.1);
        assert_eq!(config.momentum, 0.5);
        assert_eq!(config.seed, 1);
        assert_eq!(config.log_interval, 100);
    }

    #[test]
    fn test_train_config_builder() {
        let config = TrainConfig::new()
            .with_epochs(5)
            .with_batch_size(32)
            .with_log_interval(20)
            .with_seed(9);

        assert_eq!(config.epochs, 5);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.log_interval, 20);
        assert_eq!(config.seed, 9);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = TrainConfig::new().with_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_hyperparameters() {
        let config = TrainConfig {
            lr: 0.0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrainConfig {
            momentum: 1.0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrainConfig::new().with_log_interval(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_tracker() {
        let mut tracker = MetricsTracker::new();

        tracker.record_epoch(1.0, 0.1);
        tracker.record_epoch(0.8, 0.1);
        tracker.record_epoch(0.6, 0.1);

        assert_eq!(tracker.epoch, 3);
        assert_eq!(tracker.losses.len(), 3);
        assert_eq!(tracker.best_loss(), Some(0.6));
    }

    #[test]
    fn test_evaluation_tracking() {
        let mut tracker = MetricsTracker::new();

        tracker.record_epoch(1.0, 0.1);
        tracker.record_eval(0.9, 0.72);
        tracker.record_epoch(0.8, 0.1);
        tracker.record_eval(0.7, 0.81);

        assert_eq!(tracker.val_losses.len(), 2);
        assert_eq!(tracker.best_val_loss(), Some(0.7));
        assert_eq!(tracker.best_accuracy(), Some(0.81));
    }

    #[test]
    fn test_step_counter() {
        let mut tracker = MetricsTracker::new();
        tracker.increment_step();
        tracker.increment_step();
        assert_eq!(tracker.steps, 2);
    }
}
