//! Parameter initialisation.

use crate::tensor::{FloatElem, Tensor, elem_from_f64};
use rand::Rng;

/// `1/sqrt(fan_in)`, the bound of the default uniform initialisation.
pub fn fan_in_bound(fan_in: usize) -> f64 {
    1.0 / (fan_in.max(1) as f64).sqrt()
}

/// A tensor with elements drawn from `U(-bound, bound)`.
pub fn uniform<T: FloatElem>(shape: [usize; 2], bound: f64, rng: &mut impl Rng) -> Tensor<T, 2> {
    let mut t = Tensor::zeros(shape);
    for x in t.data_mut() {
        *x = elem_from_f64(rng.random_range(-bound..=bound));
    }
    t
}
