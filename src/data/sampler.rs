//! Index sampling strategies for batch iteration
//!
//! A sampler decides which dataset indices an epoch visits and in what
//! order. The distributed variant derives the same permutation on every
//! replica from the epoch number alone, so shards stay disjoint without
//! any coordination.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Epoch index source
pub enum Sampler {
    /// Yield `0..len` in order
    Sequential,
    /// Fresh permutation every epoch, drawn from an owned stream
    Shuffled(StdRng),
    /// Rank-strided share of an epoch-seeded permutation
    Distributed(DistributedSampler),
}

impl Sampler {
    /// Create a shuffled sampler with its own seeded stream
    pub fn shuffled(seed: u64) -> Self {
        Sampler::Shuffled(StdRng::seed_from_u64(seed))
    }

    /// Indices to visit in the given epoch
    pub fn indices(&mut self, len: usize, epoch: usize) -> Vec<usize> {
        match self {
            Sampler::Sequential => (0..len).collect(),
            Sampler::Shuffled(rng) => {
                let mut indices: Vec<usize> = (0..len).collect();
                indices.shuffle(rng);
                indices
            }
            Sampler::Distributed(sampler) => sampler.epoch_indices(len, epoch),
        }
    }

    /// Number of samples one epoch yields
    pub fn sample_count(&self, len: usize) -> usize {
        match self {
            Sampler::Sequential | Sampler::Shuffled(_) => len,
            Sampler::Distributed(sampler) => sampler.shard_len(len),
        }
    }
}

/// Deterministic sharding across replicas
///
/// Every rank shuffles `0..len` with the epoch number as seed, pads the
/// permutation by wrapping until it divides evenly, and takes every
/// `world_size`-th entry starting at its own rank. Shards are equal in
/// length and together cover the whole dataset.
pub struct DistributedSampler {
    world_size: usize,
    rank: usize,
}

impl DistributedSampler {
    pub fn new(world_size: usize, rank: usize) -> Self {
        assert!(world_size > 0, "world size must be positive");
        assert!(rank < world_size, "rank {rank} out of range for world size {world_size}");
        Self { world_size, rank }
    }

    /// Per-rank share size: ceil(len / world_size)
    pub fn shard_len(&self, len: usize) -> usize {
        len.div_ceil(self.world_size)
    }

    /// This rank's slice of the epoch permutation
    pub fn epoch_indices(&self, len: usize, epoch: usize) -> Vec<usize> {
        let mut permutation: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(epoch as u64);
        permutation.shuffle(&mut rng);

        // Wrap-around padding keeps every shard the same length
        let total = self.shard_len(len) * self.world_size;
        permutation
            .iter()
            .copied()
            .cycle()
            .take(total)
            .skip(self.rank)
            .step_by(self.world_size)
            .collect()
    }
}
