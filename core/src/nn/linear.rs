use super::{Module, Parameter, init};
use crate::autograd::{GradMode, Variable};
use crate::tensor::{FloatElem, Result, Tensor, TensorError};
use rand::Rng;

/// Linear Layer: `y = xWᵀ + b`
///
/// Performs a linear transformation on the input data.
///
/// # Shapes
/// - `weight`: `[out_features, in_features]`
/// - `bias`: `[1, out_features]`, added to every row
/// - input `[batch, in_features]`, output `[batch, out_features]`
///
/// # Examples
/// ```rust
/// use clip_rs::autograd::{GradMode, Variable};
/// use clip_rs::nn::Linear;
/// use clip_rs::tensor::Tensor;
///
/// let layer = Linear::<f32>::new(Tensor::ones([2, 3]), Some(Tensor::zeros([1, 2]))).unwrap();
/// let x = Variable::constant(Tensor::ones([4, 3]));
/// let y = layer.forward(&x, GradMode::Disabled).unwrap();
/// assert_eq!(y.data.shape(), &[4, 2]);
/// assert_eq!(y.data.data()[0], 3.0);
/// ```
#[derive(Debug)]
pub struct Linear<T: FloatElem> {
    pub weight: Parameter<T>,
    pub bias: Option<Parameter<T>>,
}

impl<T: FloatElem> Linear<T> {
    /// Creates a new Linear layer from explicit weights.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the bias is not `[1, out_features]`.
    pub fn new(weight: Tensor<T, 2>, bias: Option<Tensor<T, 2>>) -> Result<Self> {
        let out_features = weight.shape()[0];
        if let Some(b) = &bias {
            if b.shape() != &[1, out_features] {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![1, out_features],
                    got: b.shape().to_vec(),
                });
            }
        }
        Ok(Self {
            weight: Variable::new(weight),
            bias: bias.map(Variable::new),
        })
    }

    /// Creates a layer with weights and bias drawn from `U(-k, k)`, `k = 1/sqrt(in_features)`.
    pub fn init(in_features: usize, out_features: usize, rng: &mut impl Rng) -> Self {
        let bound = init::fan_in_bound(in_features);
        Self {
            weight: Variable::new(init::uniform([out_features, in_features], bound, rng)),
            bias: Some(Variable::new(init::uniform([1, out_features], bound, rng))),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.data.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.data.shape()[0]
    }

    /// Performs the forward pass. Parameters are tracked according to `mode`.
    pub fn forward(&self, x: &Variable<T, 2>, mode: GradMode) -> Result<Variable<T, 2>> {
        let w_t = self.weight.track(mode).transpose()?;
        let out = x.matmul(&w_t)?;
        match &self.bias {
            Some(b) => out.add_row(&b.track(mode)),
            None => Ok(out),
        }
    }
}

impl<T: FloatElem> Module<T> for Linear<T> {
    fn parameters(&self) -> Vec<&Parameter<T>> {
        std::iter::once(&self.weight).chain(self.bias.as_ref()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter<T>> {
        std::iter::once(&mut self.weight).chain(self.bias.as_mut()).collect()
    }
}
