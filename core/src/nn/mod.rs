//! Neural network building blocks.
//!
//! Layers hold their parameters as [`Parameter`]s (gradient-collecting `Variable`s) and take a
//! [`GradMode`](crate::autograd::GradMode) on every forward call, so the same layer serves both
//! the gradient-free statistics pass and the tracked gradient passes.

pub mod activation;
pub mod embedding;
pub mod init;
pub mod linear;
pub mod module;

pub use activation::Activation;
pub use embedding::Embedding;
pub use linear::Linear;
pub use module::{Module, Parameter};
