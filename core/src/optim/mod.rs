//! Optimizers and learning-rate schedules.
//!
//! Every parameter of the reference model is a rank-2 tensor (weights `[out, in]`, biases and
//! the temperature `[1, C]`), so the optimizer interface is expressed over `Tensor<T, 2>`. That
//! keeps the trait object-safe while covering the whole model.

pub mod adamw;
pub mod config;
pub mod scheduler;
pub mod sgd;

pub use adamw::AdamW;
pub use config::OptimizerConfig;
pub use scheduler::{ConstantLR, CosineAnnealingWarmRestarts, LRScheduler};
pub use sgd::Sgd;

use crate::tensor::{FloatElem, Result, Tensor};

/// A trait for optimizers (e.g., SGD, AdamW).
///
/// Optimizers are responsible for updating model parameters based on computed gradients.
pub trait Optimizer<T: FloatElem> {
    /// Updates a single parameter in place.
    ///
    /// `key` identifies the parameter across steps so that stateful optimizers can keep
    /// per-parameter moments. The training loop passes the parameter's position in
    /// `ContrastiveEncoder::parameters_mut`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter and gradient shapes differ.
    fn update(&mut self, key: usize, param: &mut Tensor<T, 2>, grad: &Tensor<T, 2>) -> Result<()>;

    /// The learning rate used by the next `update`.
    fn learning_rate(&self) -> T;

    /// Replaces the learning rate. Called by the training loop after each schedule step.
    fn set_learning_rate(&mut self, lr: T);
}

pub(crate) fn check_grad_shape<T: FloatElem>(param: &Tensor<T, 2>, grad: &Tensor<T, 2>) -> Result<()> {
    if param.shape() != grad.shape() {
        return Err(crate::tensor::TensorError::ShapeMismatch {
            expected: param.shape().to_vec(),
            got: grad.shape().to_vec(),
        });
    }
    Ok(())
}
