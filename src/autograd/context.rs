//! Execution context for managing computational graphs

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::{RefCell, RefMut};

/// Context for managing the computational graph
///
/// Tracks training vs evaluation mode (dropout is active only in
/// training) and owns the random stream the dropout masks draw from,
/// so a seeded run is reproducible end to end.
pub struct Context {
    training: bool,
    rng: RefCell<StdRng>,
}

impl Context {
    /// Create a new context in training mode with an OS-seeded stream
    pub fn new() -> Self {
        Self {
            training: true,
            rng: RefCell::new(StdRng::from_os_rng()),
        }
    }

    /// Create a context whose random stream is seeded deterministically
    pub fn with_seed(seed: u64) -> Self {
        Self {
            training: true,
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Check if in training mode
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Borrow the context's random stream
    pub fn rng(&self) -> RefMut<'_, StdRng> {
        self.rng.borrow_mut()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
