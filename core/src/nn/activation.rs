//! Activation Functions.
//!
//! Activation functions introduce **non-linearity** into a network. Without one, the two
//! layers of the image projection head would collapse into a single matrix.
//!
//! - **ReLU**: $f(x) = \max(0, x)$.
//! - **Identity**: $f(x) = x$, for linear projection heads.

use crate::autograd::Variable;
use crate::tensor::FloatElem;
use serde::{Deserialize, Serialize};

/// Element-wise activation, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    #[default]
    Relu,
}

impl Activation {
    /// Applies the activation element-wise. Gradients flow through whenever `x` is tracked.
    pub fn apply<T: FloatElem, const RANK: usize>(self, x: &Variable<T, RANK>) -> Variable<T, RANK> {
        match self {
            Activation::Identity => x.clone(),
            Activation::Relu => x.relu(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn test_relu_value() {
        let x = Variable::constant(Tensor::<f32, 2>::new(vec![-1.0, 0.0, 2.0], [1, 3]).unwrap());
        let y = Activation::Relu.apply(&x);
        assert_eq!(y.data.data(), &[0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_identity_passes_through() {
        let x = Variable::constant(Tensor::<f32, 2>::new(vec![-1.0, 2.0], [1, 2]).unwrap());
        assert_eq!(Activation::Identity.apply(&x).data, x.data);
    }

    #[test]
    fn test_deserialize() {
        let a: Activation = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(a, Activation::Relu);
        let a: Activation = serde_json::from_str("\"identity\"").unwrap();
        assert_eq!(a, Activation::Identity);
    }
}
