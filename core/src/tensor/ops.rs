//! Tensor operations.
//!
//! # Overview
//!
//! - **Element-wise Arithmetic**: `+`, `-`, `*`, `/` on `&Tensor`, plus `map` and `scale`.
//! - **Matrix Multiplication**: `[.., M, K] x [.., K, N]`, delegated to `clip-rs-kernels`.
//! - **Transpose**: swaps the last two dimensions.
//! - **Reductions**: `sum`.
//!
//! Shapes must match exactly for element-wise operations; there is no implicit broadcasting.
//! The one broadcast a linear layer needs (adding a `[1, C]` bias to every row) lives in
//! [`super::rows`].
//!
//! > [!TIP]
//! > **Efficiency Note**: element-wise operations are parallelised with `rayon`. For the small
//! > matrices of a toy run the thread hand-off dominates; for `[1024, 1024]` logit matrices it pays.
//!
//! ```rust
//! use clip_rs::tensor::Tensor;
//!
//! let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
//! let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();
//!
//! let c = (&a + &b).unwrap();
//! assert_eq!(c.data(), &[4.0, 6.0]);
//! ```

use super::{FloatElem, Result, Tensor, TensorElem, TensorError};

use rayon::prelude::*;
use std::ops::{Add, Div, Mul, Sub};

/// Implements a binary arithmetic trait for `&Tensor`, checking shapes and running the
/// element-wise loop in parallel.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident) => {
        impl<T, const RANK: usize> $trait for &Tensor<T, RANK>
        where
            T: TensorElem,
        {
            type Output = Result<Tensor<T, RANK>>;

            fn $method(self, rhs: Self) -> Self::Output {
                if self.shape != rhs.shape {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: rhs.shape.to_vec(),
                    });
                }

                let mut out = Tensor::zeros(self.shape);
                out.data
                    .par_iter_mut()
                    .zip(self.data.par_iter())
                    .zip(rhs.data.par_iter())
                    .for_each(|((o, a), b)| {
                        *o = a.$method(*b);
                    });

                Ok(out)
            }
        }
    };
}

impl_bin_op!(Add, add);
impl_bin_op!(Sub, sub);
impl_bin_op!(Mul, mul);
impl_bin_op!(Div, div);

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: TensorElem,
{
    /// Applies a function element-wise, returning a tensor of the same shape.
    ///
    /// ```rust
    /// use clip_rs::tensor::Tensor;
    /// let t = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
    /// let squared = t.map(|x| x * x);
    /// assert_eq!(squared.data(), &[1.0, 4.0, 9.0]);
    /// ```
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        let mut out = Tensor::zeros(self.shape);
        out.data
            .par_iter_mut()
            .zip(self.data.par_iter())
            .for_each(|(o, i)| *o = f(*i));
        out
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: T) -> Self {
        self.map(|x| x * factor)
    }

    /// Adds `rhs` into `self` element-wise. Used for gradient accumulation.
    pub fn add_assign(&mut self, rhs: &Self) -> Result<()> {
        if self.shape != rhs.shape {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.to_vec(),
                got: rhs.shape.to_vec(),
            });
        }
        self.data
            .par_iter_mut()
            .zip(rhs.data.par_iter())
            .for_each(|(a, b)| *a += *b);
        Ok(())
    }

    /// Sums all elements.
    pub fn sum(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &x| acc + x)
    }

    /// Matrix multiplication over the last two dimensions.
    ///
    /// - 2D x 2D: `[M, K] x [K, N] -> [M, N]`
    /// - 3D x 3D: `[B, M, K] x [B, K, N] -> [B, M, N]`
    ///
    /// Leading dimensions are batch dimensions and must match exactly.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        const { assert!(RANK >= 2, "Matmul requires rank >= 2") };

        if self.shape[..RANK - 2] != rhs.shape[..RANK - 2] {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.to_vec(),
                got: rhs.shape.to_vec(),
            });
        }

        let mut out_shape = self.shape;
        out_shape[RANK - 2] = self.shape[RANK - 2];
        out_shape[RANK - 1] = rhs.shape[RANK - 1];

        // This is where a BLAS call would be swapped in.
        let out_data =
            clip_rs_kernels::cpu_matmul(&self.data, &rhs.data, &self.shape, &rhs.shape)?;

        Tensor::new(out_data, out_shape)
    }

    /// Transposes the last two dimensions.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` for rank < 2.
    pub fn transpose(&self) -> Result<Self> {
        if RANK < 2 {
            return Err(TensorError::Unsupported(
                "Transpose requires rank >= 2".into(),
            ));
        }

        let out_data = clip_rs_kernels::cpu_transpose(&self.data, &self.shape)?;
        let mut new_shape = self.shape;
        new_shape.swap(RANK - 1, RANK - 2);

        Tensor::new(out_data, new_shape)
    }
}

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: FloatElem,
{
    /// Element-wise `exp`.
    pub fn exp(&self) -> Self {
        self.map(|x| x.exp())
    }

    /// Element-wise natural logarithm.
    pub fn ln(&self) -> Self {
        self.map(|x| x.ln())
    }

    /// Mean over all elements. Returns zero for an empty tensor.
    pub fn mean(&self) -> T {
        if self.data.is_empty() {
            return T::zero();
        }
        self.sum() / T::from_usize(self.data.len()).unwrap_or_else(T::one)
    }
}
