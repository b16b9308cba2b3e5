//! Dataset loading and batch iteration

mod loader;
mod mnist;
mod sampler;

pub use loader::{Batches, DataLoader};
pub use mnist::{MnistDataset, IMAGE_PIXELS, IMAGE_SIDE};
pub use sampler::{DistributedSampler, Sampler};
