//! Strategies for sampling indices from a dataset.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// A trait for determining the order of data access.
pub trait Sampler: Send + Sync {
    /// Returns the indices to visit, in order.
    ///
    /// # Arguments
    ///
    /// * `len`: The length of the dataset.
    fn sample(&self, len: usize) -> Vec<usize>;
}

/// Samples elements sequentially, always in the same order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialSampler;

impl Sampler for SequentialSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        (0..len).collect()
    }
}

/// Samples elements randomly (without replacement).
///
/// With a seed the permutation is reproducible, which replicas rely on to agree on the order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSampler {
    seed: Option<u64>,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        match self.seed {
            Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => indices.shuffle(&mut rand::rng()),
        }
        indices
    }
}

/// Gives replica `rank` of `world_size` every `world_size`-th index of a shared order.
///
/// The order is truncated to a multiple of `world_size` first, so every replica gets the same
/// number of items and therefore batches of the same size, which the collectives require.
#[derive(Debug, Clone, Copy)]
pub struct DistributedSampler {
    rank: usize,
    world_size: usize,
    order: RandomOrSequential,
}

#[derive(Debug, Clone, Copy)]
enum RandomOrSequential {
    Sequential,
    Random(RandomSampler),
}

impl DistributedSampler {
    /// Sequential shared order. `world_size` is raised to at least 1.
    pub fn new(rank: usize, world_size: usize) -> Self {
        Self {
            rank,
            world_size: world_size.max(1),
            order: RandomOrSequential::Sequential,
        }
    }

    /// Shuffles the shared order with `seed`. All replicas must use the same seed.
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.order = RandomOrSequential::Random(RandomSampler::seeded(seed));
        self
    }

    /// Items each replica receives from a dataset of `len` items.
    pub fn shard_len(&self, len: usize) -> usize {
        len / self.world_size
    }
}

impl Sampler for DistributedSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        let mut order = match self.order {
            RandomOrSequential::Sequential => SequentialSampler.sample(len),
            RandomOrSequential::Random(r) => r.sample(len),
        };
        order.truncate(self.shard_len(len) * self.world_size);
        order
            .into_iter()
            .skip(self.rank)
            .step_by(self.world_size)
            .collect()
    }
}
