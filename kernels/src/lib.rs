//! CPU kernels for `clip-rs`.
//!
//! Kernels work on flat, row-major slices and know nothing about `Tensor`. Keeping them in a
//! separate crate lets the tensor layer swap in a BLAS call or an accelerator without touching
//! the autograd or training code.

use num_traits::{Float, FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod cpu_matmul;
pub mod cpu_rows;
pub mod cpu_transpose;

pub use cpu_matmul::cpu_matmul;
pub use cpu_rows::{cpu_l2_normalize_rows, cpu_log_softmax_rows};
pub use cpu_transpose::cpu_transpose;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Trait bound for elements that can be processed by kernels.
/// This mirrors `TensorElem` in the main crate to avoid circular dependencies.
pub trait KernelElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> KernelElem for T where
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

/// Floating point kernel elements (needed by `exp`, `ln`, `sqrt`).
pub trait KernelFloat: KernelElem + Float {}

impl<T> KernelFloat for T where T: KernelElem + Float {}

pub(crate) fn check_len(data_len: usize, shape: &[usize]) -> Result<()> {
    let size: usize = shape.iter().product();
    if data_len != size {
        return Err(KernelError::ShapeMismatch {
            expected: vec![size],
            got: vec![data_len],
        });
    }
    Ok(())
}
