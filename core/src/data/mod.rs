//! Data loading and processing utilities.
//!
//! This module provides primitives for loading, sampling, and batching image-text pairs.
//!
//! # Components
//!
//! - **Dataset**: A trait for accessing individual data items.
//! - **Sampler**: A trait for determining the order of data access. [`DistributedSampler`]
//!   gives every replica a disjoint, equally sized shard.
//! - **DataLoader**: An iterator that batches and collates data from a Dataset.
//! - **PairCollate**: Stacks [`ImageTextPair`]s into a [`ClipBatch`](crate::clip::ClipBatch).

pub mod collate;
pub mod loader;
pub mod sampler;

pub use collate::{ImageTextPair, PairCollate};
pub use loader::{Collate, DataLoader, DataLoaderIter};
pub use sampler::{DistributedSampler, RandomSampler, Sampler, SequentialSampler};

/// A trait for accessing data items.
///
/// A `Dataset` represents a collection of data items that can be accessed by index.
///
/// # Type Parameters
///
/// * `T`: The type of the data item returned by `get`.
pub trait Dataset<T>: Send + Sync {
    /// Returns the total number of items in the dataset.
    fn len(&self) -> usize;

    /// Returns `true` if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the item at the given index.
    ///
    /// # Panics
    ///
    /// May panic if `index` is out of bounds.
    fn get(&self, index: usize) -> T;
}

impl<T: Clone + Send + Sync> Dataset<T> for Vec<T> {
    fn len(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}
