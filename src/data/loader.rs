//! Batched iteration over a dataset
//!
//! A loader pairs a dataset with a sampling strategy and yields ready
//! mini-batches. The final short batch of a pass is kept, never dropped.

use crate::data::mnist::{MnistDataset, IMAGE_PIXELS};
use crate::data::sampler::Sampler;
use crate::train::Batch;
use crate::Tensor;

pub struct DataLoader<'a> {
    dataset: &'a MnistDataset,
    batch_size: usize,
    sampler: Sampler,
    epoch: usize,
}

impl<'a> DataLoader<'a> {
    pub fn new(dataset: &'a MnistDataset, batch_size: usize, sampler: Sampler) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        Self {
            dataset,
            batch_size,
            sampler,
            epoch: 0,
        }
    }

    /// Advance to a new epoch, reseeding distributed shards
    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    /// Samples one pass yields (the shard size when distributed)
    pub fn sample_count(&self) -> usize {
        self.sampler.sample_count(self.dataset.len())
    }

    /// Samples in the underlying dataset, across all shards
    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    /// Batches per pass
    pub fn num_batches(&self) -> usize {
        self.sample_count().div_ceil(self.batch_size)
    }

    /// Draw this epoch's indices and iterate them in batches
    ///
    /// The iterator borrows only the dataset, so the loader itself is
    /// free to be reconfigured while iteration is in flight.
    pub fn iter(&mut self) -> Batches<'a> {
        let indices = self.sampler.indices(self.dataset.len(), self.epoch);
        Batches {
            dataset: self.dataset,
            indices,
            batch_size: self.batch_size,
            cursor: 0,
        }
    }
}

/// Batch iterator for one epoch
pub struct Batches<'a> {
    dataset: &'a MnistDataset,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.indices.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let selected = &self.indices[self.cursor..end];
        self.cursor = end;

        let mut inputs = Vec::with_capacity(selected.len() * IMAGE_PIXELS);
        let mut targets = Vec::with_capacity(selected.len());
        for &index in selected {
            inputs.extend_from_slice(self.dataset.image(index));
            targets.push(self.dataset.label(index) as f32);
        }

        Some(Batch::new(
            Tensor::from_vec(inputs, false),
            Tensor::from_vec(targets, false),
        ))
    }
}
