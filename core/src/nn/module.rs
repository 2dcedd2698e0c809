use crate::autograd::Variable;
use crate::tensor::FloatElem;
use std::fmt::Debug;

/// A learnable parameter. Every parameter in this crate is a matrix: weights are
/// `[out, in]`, biases and scalars are single rows.
pub type Parameter<T> = Variable<T, 2>;

/// A Module trait for Neural Network layers.
///
/// A module owns its parameters. Exposing them in a fixed order lets the training loop zero
/// their gradients, synchronise them across replicas and hand them to the optimizer, which keys
/// its per-parameter state by position in that order.
pub trait Module<T: FloatElem>: Debug {
    /// All parameters, in a stable order.
    fn parameters(&self) -> Vec<&Parameter<T>>;

    /// Mutable access to all parameters, in the same order as [`Module::parameters`].
    fn parameters_mut(&mut self) -> Vec<&mut Parameter<T>>;

    /// Clears the accumulated gradient of every parameter.
    fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    /// Total number of scalar weights.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.data.size()).sum()
    }
}
