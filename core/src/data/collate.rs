//! Collation of image-text pairs into training batches.

use super::loader::Collate;
use crate::clip::ClipBatch;
use crate::tensor::{FloatElem, Tensor, TensorError};
use crate::{Error, Result};
use std::marker::PhantomData;

/// One training example: a decoded, flattened image and its caption's token ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTextPair<T> {
    pub image: Vec<T>,
    pub tokens: Vec<usize>,
}

/// Stacks pairs row by row into a [`ClipBatch`].
///
/// All images must have the same length, and so must all token sequences.
pub struct PairCollate<T>(PhantomData<T>);

impl<T: FloatElem> Collate<ImageTextPair<T>> for PairCollate<T> {
    type Output = Result<ClipBatch<T>>;

    fn collate(batch: Vec<ImageTextPair<T>>) -> Self::Output {
        let first = batch.first().ok_or(Error::EmptyBatch)?;
        let image_dim = first.image.len();
        let seq_len = first.tokens.len();

        let mut images = Vec::with_capacity(batch.len() * image_dim);
        let mut texts = Vec::with_capacity(batch.len() * seq_len);
        for pair in &batch {
            if pair.image.len() != image_dim {
                return Err(ragged(image_dim, pair.image.len()));
            }
            if pair.tokens.len() != seq_len {
                return Err(ragged(seq_len, pair.tokens.len()));
            }
            images.extend_from_slice(&pair.image);
            texts.extend_from_slice(&pair.tokens);
        }

        ClipBatch::new(
            Tensor::new(images, [batch.len(), image_dim])?,
            Tensor::new(texts, [batch.len(), seq_len])?,
        )
    }
}

fn ragged(expected: usize, got: usize) -> Error {
    TensorError::ShapeMismatch {
        expected: vec![expected],
        got: vec![got],
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataLoader, SequentialSampler};

    fn pair(v: f32, t: usize) -> ImageTextPair<f32> {
        ImageTextPair {
            image: vec![v, v + 0.5],
            tokens: vec![t, t + 1, t + 2],
        }
    }

    #[test]
    fn test_collate_pairs() {
        let batch = PairCollate::collate(vec![pair(1.0, 0), pair(2.0, 5)]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.images.data(), &[1.0, 1.5, 2.0, 2.5]);
        assert_eq!(batch.texts.shape(), &[2, 3]);
        assert_eq!(batch.texts.data()[3], 5);
    }

    #[test]
    fn test_collate_rejects_ragged_and_empty() {
        let mut short = pair(1.0, 0);
        short.tokens.pop();
        assert!(PairCollate::collate(vec![pair(0.0, 0), short]).is_err());
        assert!(matches!(
            PairCollate::<f32>::collate(vec![]),
            Err(Error::EmptyBatch)
        ));
    }

    #[test]
    fn test_loader_yields_clip_batches() {
        let data: Vec<_> = (0..5).map(|i| pair(i as f32, i)).collect();
        let loader: DataLoader<_, _, PairCollate<f32>> =
            DataLoader::with_collate(data, 2).with_sampler(SequentialSampler);
        let batches: Vec<_> = loader.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 1);
        assert_eq!(batches[1].images.data()[0], 2.0);
    }
}
