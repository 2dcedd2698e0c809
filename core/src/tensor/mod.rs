//! Core Tensor implementation.
//!
//! A `Tensor` is a dense, row-major N-dimensional array. It is the value type that flows through
//! the encoders, the autograd tape and the collectives:
//!
//! - **Rank 0**: the loss and the `logit_scale` temperature.
//! - **Rank 2**: image batches `[N, image_dim]`, token batches `[N, seq_len]`, embeddings
//!   `[N, D]` and logit matrices `[N_total, N_total]`.
//!
//! ```rust
//! use clip_rs::tensor::Tensor;
//!
//! let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let tensor = Tensor::<f32, 2>::new(data, [2, 3]).unwrap();
//!
//! assert_eq!(tensor.shape(), &[2, 3]);
//! assert_eq!(tensor.data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! ```
//!
//! > [!TIP]
//! > **Strides and Memory Layout**
//! > Storage is always contiguous. Operations that permute axes (such as `transpose`) move data
//! > instead of rewriting strides, so every tensor can be handed to a kernel as a flat slice.

use num_traits::{Float, FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod ops;
pub mod rows;

/// Error type for Tensor operations.
#[derive(Error, Debug)]
pub enum TensorError {
    /// The shape of the data does not match the expected shape.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// An index is out of bounds for the given shape.
    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
    /// The requested operation is not supported (e.g., for a specific rank or type).
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl From<clip_rs_kernels::KernelError> for TensorError {
    fn from(err: clip_rs_kernels::KernelError) -> Self {
        match err {
            clip_rs_kernels::KernelError::ShapeMismatch { expected, got } => {
                TensorError::ShapeMismatch { expected, got }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Trait bound for elements that can be stored in a Tensor.
///
/// `usize` qualifies, which is how token-id batches are stored.
pub trait TensorElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> TensorElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// Floating point tensor elements. Everything that is differentiated uses this bound.
pub trait FloatElem: TensorElem + Float + 'static {}

impl<T> FloatElem for T where T: TensorElem + Float + 'static {}

/// An N-dimensional array with a compile-time rank.
///
/// The rank lives in the type so that a function such as `fn encode(x: &Tensor<f32, 2>)` states
/// what it accepts; the sizes of each dimension are runtime values so that batch sizes and chunk
/// sizes can vary from call to call.
#[derive(Clone, PartialEq)]
pub struct Tensor<T, const RANK: usize>
where
    T: TensorElem,
{
    shape: [usize; RANK],
    strides: [usize; RANK],
    data: Vec<T>,
}

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: TensorElem,
{
    /// Creates a new Tensor from a vector of data and a shape.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the length of `data` does not match the product of `shape`.
    pub fn new(data: Vec<T>, shape: [usize; RANK]) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![size],
                got: vec![data.len()],
            });
        }

        Ok(Self {
            shape,
            strides: compute_strides(&shape),
            data,
        })
    }

    /// Creates a new Tensor filled with `value`.
    pub fn full(shape: [usize; RANK], value: T) -> Self {
        let size: usize = shape.iter().product();
        Self {
            shape,
            strides: compute_strides(&shape),
            data: vec![value; size],
        }
    }

    /// Creates a new Tensor filled with zeros.
    pub fn zeros(shape: [usize; RANK]) -> Self {
        Self::full(shape, T::zero())
    }

    /// Creates a new Tensor filled with ones.
    pub fn ones(shape: [usize; RANK]) -> Self {
        Self::full(shape, T::one())
    }

    /// Reshapes the tensor to a new shape. The number of elements must remain the same.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the element counts differ.
    pub fn reshape<const NEW_RANK: usize>(
        self,
        new_shape: [usize; NEW_RANK],
    ) -> Result<Tensor<T, NEW_RANK>> {
        let current_size: usize = self.shape.iter().product();
        let new_size: usize = new_shape.iter().product();

        if current_size != new_size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![current_size],
                got: vec![new_size],
            });
        }

        Ok(Tensor {
            shape: new_shape,
            strides: compute_strides(&new_shape),
            data: self.data,
        })
    }

    /// Returns the shape of the tensor.
    pub const fn shape(&self) -> &[usize; RANK] {
        &self.shape
    }

    /// Returns the strides of the tensor.
    pub const fn strides(&self) -> &[usize; RANK] {
        &self.strides
    }

    /// Returns the underlying data as a flat slice.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns the underlying data as a mutable flat slice.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the tensor and returns its flat data.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Returns the total number of elements in the tensor.
    pub const fn size(&self) -> usize {
        let mut size = 1;
        let mut i = 0;
        while i < RANK {
            size *= self.shape[i];
            i += 1;
        }
        size
    }
}

impl<T> Tensor<T, 0>
where
    T: TensorElem,
{
    /// Creates a rank-0 tensor holding a single value.
    pub fn scalar(value: T) -> Self {
        Self::full([], value)
    }

    /// Returns the value of a rank-0 tensor.
    pub fn item(&self) -> T {
        self.data[0]
    }
}

/// Converts a count (batch size, sequence length) into an element value.
pub(crate) fn elem_from_usize<T: TensorElem>(n: usize) -> Result<T> {
    T::from_usize(n).ok_or_else(|| TensorError::Unsupported(format!("{n} is not representable")))
}

/// Converts a hyperparameter into an element value.
///
/// Conversions into `f32` and `f64` always succeed; a float type that cannot represent `v`
/// yields NaN, which surfaces in the first loss that uses it.
pub(crate) fn elem_from_f64<T: FloatElem>(v: f64) -> T {
    T::from_f64(v).unwrap_or_else(T::nan)
}

/// Computes row-major strides for a shape.
///
/// The stride of a dimension is the number of elements to skip to move one step along it.
pub(crate) const fn compute_strides<const RANK: usize>(shape: &[usize; RANK]) -> [usize; RANK] {
    let mut strides = [0; RANK];
    let mut stride = 1;
    let mut i = RANK;
    while i > 0 {
        i -= 1;
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

impl<T, const RANK: usize> Debug for Tensor<T, RANK>
where
    T: TensorElem,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data_len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let tensor = Tensor::<f32, 2>::new(data.clone(), [2, 2]).unwrap();
        assert_eq!(tensor.shape(), &[2, 2]);
        assert_eq!(tensor.data(), &data[..]);

        let err = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0], [2, 2]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_zeros_ones_full() {
        assert_eq!(Tensor::<f32, 2>::zeros([2, 3]).data(), &[0.0; 6]);
        assert_eq!(Tensor::<f32, 2>::ones([2, 3]).data(), &[1.0; 6]);
        assert_eq!(Tensor::<usize, 1>::full([3], 7).data(), &[7, 7, 7]);
    }

    #[test]
    fn test_scalar() {
        let t = Tensor::<f64, 0>::scalar(2.5);
        assert!(t.shape().is_empty());
        assert_eq!(t.size(), 1);
        assert_eq!(t.item(), 2.5);
    }

    #[test]
    fn test_reshape() {
        let tensor = Tensor::<f32, 2>::zeros([2, 3]);

        let reshaped = tensor.reshape([3, 2]).unwrap();
        assert_eq!(reshaped.shape(), &[3, 2]);
        assert_eq!(reshaped.strides(), &[2, 1]);

        let err = reshaped.reshape([4, 2]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_empty_rows() {
        let t = Tensor::<f32, 2>::new(vec![], [0, 4]).unwrap();
        assert_eq!(t.size(), 0);
    }

    #[test]
    fn test_compute_strides() {
        assert_eq!(compute_strides(&[2, 3, 4]), [12, 4, 1]);
        assert_eq!(compute_strides::<0>(&[]), [0usize; 0]);
    }

    #[test]
    fn test_macro() {
        let t = crate::tensor!([1.0, 2.0, 3.0, 4.0], [2, 2]);
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_tensor_error_display() {
        let err = TensorError::ShapeMismatch {
            expected: vec![2, 2],
            got: vec![4],
        };
        assert_eq!(
            format!("{}", err),
            "Shape mismatch: expected [2, 2], got [4]"
        );

        let err = TensorError::IndexOutOfBounds {
            index: vec![3],
            shape: vec![2],
        };
        assert_eq!(
            format!("{}", err),
            "Index out of bounds: index [3] for shape [2]"
        );
    }

    #[test]
    fn test_tensor_debug() {
        let t = Tensor::<f32, 1>::new(vec![1.0], [1]).unwrap();
        let debug_str = format!("{:?}", t);
        assert!(debug_str.contains("Tensor"));
        assert!(debug_str.contains("shape"));
    }
}
