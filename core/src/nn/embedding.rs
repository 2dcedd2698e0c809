use super::{Module, Parameter, init};
use crate::autograd::{GradMode, Variable};
use crate::tensor::{FloatElem, Result, Tensor};
use rand::Rng;

/// Token embedding table with mean pooling over the sequence.
///
/// Turns a `[batch, seq_len]` batch of token ids into one `[batch, dim]` vector per sequence.
#[derive(Debug)]
pub struct Embedding<T: FloatElem> {
    /// Shape `[vocab_size, dim]`.
    pub weight: Parameter<T>,
}

impl<T: FloatElem> Embedding<T> {
    pub fn new(weight: Tensor<T, 2>) -> Self {
        Self {
            weight: Variable::new(weight),
        }
    }

    /// Draws the table from `U(-k, k)`, `k = 1/sqrt(dim)`.
    pub fn init(vocab_size: usize, dim: usize, rng: &mut impl Rng) -> Self {
        Self::new(init::uniform([vocab_size, dim], init::fan_in_bound(dim), rng))
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.data.shape()[0]
    }

    /// Averages the embeddings of each sequence's tokens.
    pub fn forward_mean(&self, ids: &Tensor<usize, 2>, mode: GradMode) -> Result<Variable<T, 2>> {
        self.weight.track(mode).embedding_mean(ids)
    }
}

impl<T: FloatElem> Module<T> for Embedding<T> {
    fn parameters(&self) -> Vec<&Parameter<T>> {
        vec![&self.weight]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter<T>> {
        vec![&mut self.weight]
    }
}
