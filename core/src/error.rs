//! Crate-level error type.
//!
//! Tensor and autograd code reports [`TensorError`]; everything above it (collectives,
//! configuration, the training step) reports [`Error`], which wraps tensor failures.

use crate::tensor::TensorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Tensor(#[from] TensorError),
    /// A collective operation failed (peer gone, mismatched payloads).
    #[error("Collective error: {0}")]
    Collective(String),
    /// The model name has no entry in the optimizer table.
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    /// Image and text batches have different numbers of rows.
    #[error("Batch mismatch: {images} images, {texts} texts")]
    BatchMismatch { images: usize, texts: usize },
    #[error("Empty batch")]
    EmptyBatch,
    /// A configuration value is out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
