use super::{Optimizer, check_grad_shape};
use crate::tensor::{FloatElem, Result, Tensor};
use rayon::prelude::*;

/// Stochastic Gradient Descent (SGD) optimizer.
///
/// Updates parameters using the rule:
/// `param = param - learning_rate * grad`
#[derive(Debug)]
pub struct Sgd<T: FloatElem> {
    pub learning_rate: T,
}

impl<T: FloatElem> Sgd<T> {
    pub fn new(learning_rate: T) -> Self {
        Self { learning_rate }
    }
}

impl<T: FloatElem> Optimizer<T> for Sgd<T> {
    fn update(&mut self, _key: usize, param: &mut Tensor<T, 2>, grad: &Tensor<T, 2>) -> Result<()> {
        check_grad_shape(param, grad)?;

        let lr = self.learning_rate;

        param
            .data_mut()
            .par_iter_mut()
            .zip(grad.data().par_iter())
            .for_each(|(p, g)| {
                *p = *p - lr * *g;
            });

        Ok(())
    }

    fn learning_rate(&self) -> T {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: T) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn test_sgd_new() {
        let sgd = Sgd::new(0.1);
        assert_eq!(sgd.learning_rate, 0.1);
    }

    #[test]
    fn test_sgd_update() {
        let mut sgd = Sgd::new(0.1);
        let mut param = Tensor::new(vec![1.0, 2.0], [1, 2]).unwrap();
        let grad = Tensor::new(vec![0.5, -0.5], [1, 2]).unwrap();

        sgd.update(0, &mut param, &grad).unwrap();

        // [1.0, 2.0] - 0.1 * [0.5, -0.5]
        assert!((param.data()[0] - 0.95f64).abs() < 1e-6);
        assert!((param.data()[1] - 2.05f64).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_update_shape_mismatch() {
        let mut sgd = Sgd::new(0.1);
        let mut param = Tensor::new(vec![1.0, 2.0], [1, 2]).unwrap();
        let grad = Tensor::new(vec![0.5], [1, 1]).unwrap();

        let result = sgd.update(0, &mut param, &grad);
        assert!(result.is_err());
    }
}
