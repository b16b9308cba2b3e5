//! Network building blocks and the digit classifier

mod layers;
mod net;

pub use layers::{Conv2d, Linear};
pub use net::{Net, NUM_CLASSES, PARAMETER_SHAPES};
