//! # clip-rs
//!
//! `clip-rs` trains CLIP-style dual encoders with a contrastive loss, on a small pure Rust
//! tensor and autograd core. It runs on **CPU only**.
//!
//! The centrepiece is [`clip::ClipTrainer`], a training step that keeps memory bounded by
//! back-propagating one mini-chunk of the batch at a time, and that aggregates embeddings across
//! data-parallel replicas with an all-gather.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: Core N-dimensional tensor implementation.
//! - [`autograd`]: Tape-based reverse-mode differentiation.
//! - [`nn`]: Layers (Linear, Embedding, activations).
//! - [`loss`]: Cross-entropy and accuracy.
//! - [`optim`]: AdamW, SGD, learning-rate schedules, per-model hyperparameters.
//! - [`distributed`]: Collective backends (single process, CPU ring).
//! - [`data`]: Datasets, samplers, loaders and collation into batches.
//! - [`clip`]: The contrastive model, training step and validation step.
//! - [`logging`]: `tracing` subscriber setup for binaries.
//!
//! ## Example
//!
//! ```rust
//! use clip_rs::tensor::Tensor;
//!
//! let data = vec![1.0, 2.0, 3.0, 4.0];
//! let tensor = Tensor::<f32, 2>::new(data, [2, 2]).unwrap();
//! let product = tensor.matmul(&tensor.transpose().unwrap()).unwrap();
//! assert_eq!(product.data(), &[5.0, 11.0, 11.0, 25.0]);
//! ```

/// Macro for creating a Tensor with compile-time shape checking.
///
/// # Examples
///
/// ```rust
/// use clip_rs::tensor;
/// use clip_rs::tensor::Tensor;
///
/// // Works
/// let t = tensor!([1.0, 2.0, 3.0, 4.0], [2, 2]);
///
/// // Fails to compile:
/// // let t = tensor!([1.0, 2.0, 3.0], [2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($data:expr, $shape:expr) => {{
        // Constants to force compile-time evaluation
        const DATA_LEN: usize = (&$data as &[_]).len();
        const SHAPE: [usize; (&$shape as &[_]).len()] = $shape;
        const EXPECTED_SIZE: usize = {
            let mut size = 1;
            let mut i = 0;
            while i < (&SHAPE as &[_]).len() {
                size *= SHAPE[i];
                i += 1;
            }
            size
        };

        // This assertion triggers a compile-time error if false
        const _: () = assert!(
            DATA_LEN == EXPECTED_SIZE,
            "Shape mismatch: data length does not match shape product"
        );

        match $crate::tensor::Tensor::new($data.to_vec(), $shape) {
            Ok(t) => t,
            Err(_) => unreachable!("shape checked at compile time"),
        }
    }};
}

pub mod autograd;
pub mod clip;
pub mod data;
pub mod distributed;
pub mod error;
pub mod logging;
pub mod loss;
pub mod nn;
pub mod optim;
pub mod tensor;

pub use autograd::{GradMode, Variable};
pub use error::{Error, Result};
pub use tensor::{FloatElem, Tensor, TensorElem, TensorError};
