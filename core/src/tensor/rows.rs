//! Row-oriented operations on rank-2 tensors.
//!
//! A batch is a `[rows, features]` matrix, so chunking a batch, gathering replicas and reading
//! predictions off a logit matrix all come down to slicing, stacking and reducing rows.

use super::{FloatElem, Result, Tensor, TensorElem, TensorError};
use std::ops::Range;

impl<T> Tensor<T, 2>
where
    T: TensorElem,
{
    /// Number of rows (`shape[0]`).
    pub fn rows(&self) -> usize {
        self.shape()[0]
    }

    /// Number of columns (`shape[1]`).
    pub fn cols(&self) -> usize {
        self.shape()[1]
    }

    /// Copies the rows in `range` into a new tensor.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if the range runs past the last row.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self> {
        let [rows, cols] = *self.shape();
        if range.start > range.end || range.end > rows {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![range.start, range.end],
                shape: self.shape().to_vec(),
            });
        }
        let data = self.data()[range.start * cols..range.end * cols].to_vec();
        Tensor::new(data, [range.len(), cols])
    }

    /// Stacks tensors on top of each other, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` for an empty list and `TensorError::ShapeMismatch`
    /// if the column counts differ.
    pub fn concat_rows(parts: &[Self]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| TensorError::Unsupported("concat_rows of zero tensors".into()))?;
        let cols = first.cols();

        let mut rows = 0;
        let mut data = Vec::with_capacity(parts.iter().map(|p| p.size()).sum());
        for part in parts {
            if part.cols() != cols {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![part.rows(), cols],
                    got: part.shape().to_vec(),
                });
            }
            rows += part.rows();
            data.extend_from_slice(part.data());
        }
        Tensor::new(data, [rows, cols])
    }

    /// Adds a `[1, cols]` row to every row.
    pub fn add_row(&self, row: &Self) -> Result<Self> {
        let cols = self.cols();
        if row.shape() != &[1, cols] {
            return Err(TensorError::ShapeMismatch {
                expected: vec![1, cols],
                got: row.shape().to_vec(),
            });
        }
        let mut out = self.clone();
        if cols > 0 {
            for chunk in out.data_mut().chunks_mut(cols) {
                for (o, &b) in chunk.iter_mut().zip(row.data()) {
                    *o += b;
                }
            }
        }
        Ok(out)
    }

    /// Sums over rows, producing a `[1, cols]` tensor.
    pub fn sum_rows(&self) -> Self {
        let cols = self.cols();
        let mut out = Tensor::zeros([1, cols]);
        if cols > 0 {
            for chunk in self.data().chunks(cols) {
                for (o, &x) in out.data_mut().iter_mut().zip(chunk) {
                    *o += x;
                }
            }
        }
        out
    }

    /// For every column, the row index of its largest element (first one on ties).
    pub fn argmax_axis0(&self) -> Vec<usize> {
        let [rows, cols] = *self.shape();
        let data = self.data();
        (0..cols)
            .map(|c| {
                let mut best = 0;
                for r in 1..rows {
                    if data[r * cols + c] > data[best * cols + c] {
                        best = r;
                    }
                }
                best
            })
            .collect()
    }
}

impl<T> Tensor<T, 2>
where
    T: FloatElem,
{
    /// Row-wise `log_softmax`.
    pub fn log_softmax_rows(&self) -> Result<Self> {
        let out = clip_rs_kernels::cpu_log_softmax_rows(self.data(), self.shape())?;
        Tensor::new(out, *self.shape())
    }

    /// Divides each row by `max(||row||, eps)`; also returns the clamped norms.
    pub fn l2_normalize_rows(&self, eps: T) -> Result<(Self, Vec<T>)> {
        let (out, norms) = clip_rs_kernels::cpu_l2_normalize_rows(self.data(), self.shape(), eps)?;
        Ok((Tensor::new(out, *self.shape())?, norms))
    }
}
