use crate::tensor::{FloatElem, Tensor};
use crate::{Error, Result};
use std::ops::Range;

/// A batch of aligned image/text pairs. Row `i` of `images` belongs with row `i` of `texts`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipBatch<T: FloatElem> {
    /// Decoded, flattened images: `[N, image_dim]`.
    pub images: Tensor<T, 2>,
    /// Token ids: `[N, seq_len]`.
    pub texts: Tensor<usize, 2>,
}

impl<T: FloatElem> ClipBatch<T> {
    /// # Errors
    ///
    /// Returns `Error::BatchMismatch` if the row counts differ.
    pub fn new(images: Tensor<T, 2>, texts: Tensor<usize, 2>) -> Result<Self> {
        if images.rows() != texts.rows() {
            return Err(Error::BatchMismatch {
                images: images.rows(),
                texts: texts.rows(),
            });
        }
        Ok(Self { images, texts })
    }

    pub fn len(&self) -> usize {
        self.images.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The pairs in `range`.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        Ok(Self {
            images: self.images.slice_rows(range.clone())?,
            texts: self.texts.slice_rows(range)?,
        })
    }

    /// Concatenates batches in order.
    pub fn concat(parts: &[Self]) -> Result<Self> {
        let images: Vec<_> = parts.iter().map(|b| b.images.clone()).collect();
        let texts: Vec<_> = parts.iter().map(|b| b.texts.clone()).collect();
        Self::new(Tensor::concat_rows(&images)?, Tensor::concat_rows(&texts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> ClipBatch<f32> {
        ClipBatch::new(
            Tensor::new((0..n * 2).map(|i| i as f32).collect(), [n, 2]).unwrap(),
            Tensor::new((0..n * 3).collect(), [n, 3]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_batch_mismatch() {
        let err = ClipBatch::new(Tensor::<f32, 2>::zeros([2, 2]), Tensor::zeros([3, 1]));
        assert!(matches!(err, Err(Error::BatchMismatch { images: 2, texts: 3 })));
    }

    #[test]
    fn test_slice_and_concat() {
        let b = batch(4);
        let head = b.slice(0..1).unwrap();
        let tail = b.slice(1..4).unwrap();
        assert_eq!(head.len(), 1);
        assert_eq!(tail.texts.data()[0], 3);
        assert_eq!(ClipBatch::concat(&[head, tail]).unwrap(), b);
    }
}
