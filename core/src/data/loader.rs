//! Batching a dataset in sampler order.

use super::{Dataset, Sampler, SequentialSampler};
use std::marker::PhantomData;
use std::sync::Arc;

/// Turns the items of one batch into the batch type the training step consumes.
pub trait Collate<T> {
    type Output;

    fn collate(items: Vec<T>) -> Self::Output;
}

/// Yields collated batches of `batch_size` items, visiting indices in the order its sampler
/// produces.
///
/// In data-parallel training each replica owns a loader over the same dataset with its own
/// [`DistributedSampler`](super::DistributedSampler); with `drop_last(true)` all replicas then
/// produce the same number of equally sized batches.
pub struct DataLoader<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    batch_size: usize,
    sampler: Box<dyn Sampler>,
    drop_last: bool,
    _marker: PhantomData<(T, C)>,
}

impl<D, T, C> DataLoader<D, T, C>
where
    D: Dataset<T> + 'static,
    C: Collate<T>,
{
    /// Sequential order, keeping a short final batch. A `batch_size` of 0 is treated as 1.
    pub fn with_collate(dataset: D, batch_size: usize) -> Self {
        Self {
            dataset: Arc::new(dataset),
            batch_size: batch_size.max(1),
            sampler: Box::new(SequentialSampler),
            drop_last: false,
            _marker: PhantomData,
        }
    }

    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Skips a final batch shorter than `batch_size`.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Number of batches one pass yields.
    pub fn num_batches(&self) -> usize {
        let items = self.sampler.sample(self.dataset.len()).len();
        if self.drop_last {
            items / self.batch_size
        } else {
            items.div_ceil(self.batch_size)
        }
    }

    /// One pass over the dataset. Random samplers draw a fresh order per call.
    pub fn iter(&self) -> DataLoaderIter<D, T, C> {
        DataLoaderIter {
            dataset: Arc::clone(&self.dataset),
            indices: self.sampler.sample(self.dataset.len()),
            batch_size: self.batch_size,
            cursor: 0,
            drop_last: self.drop_last,
            _marker: PhantomData,
        }
    }
}

pub struct DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    drop_last: bool,
    _marker: PhantomData<(T, C)>,
}

impl<D, T, C> Iterator for DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    type Item = C::Output;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.indices.len().saturating_sub(self.cursor);
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return None;
        }

        let end = self.cursor + remaining.min(self.batch_size);
        let items = self.indices[self.cursor..end]
            .iter()
            .map(|&idx| self.dataset.get(idx))
            .collect();
        self.cursor = end;

        Some(C::collate(items))
    }
}
