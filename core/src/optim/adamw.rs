use super::{Optimizer, check_grad_shape};
use crate::tensor::{FloatElem, Result, Tensor, elem_from_f64};
use rayon::prelude::*;
use std::collections::HashMap;

/// AdamW optimizer.
///
/// Implements Adam algorithm with Weight Decay fix as described in [Decoupled Weight Decay Regularization](https://arxiv.org/abs/1711.05101).
///
/// # Formula
///
/// $$
/// \begin{aligned}
/// & m_t = \beta_1 m_{t-1} + (1 - \beta_1) g_t \\
/// & v_t = \beta_2 v_{t-1} + (1 - \beta_2) g_t^2 \\
/// & \hat{m}_t = m_t / (1 - \beta_1^t) \\
/// & \hat{v}_t = v_t / (1 - \beta_2^t) \\
/// & \theta_t = \theta_{t-1} - \eta (\hat{m}_t / (\sqrt{\hat{v}_t} + \epsilon) + \lambda \theta_{t-1})
/// \end{aligned}
/// $$
#[derive(Debug)]
pub struct AdamW<T: FloatElem> {
    pub learning_rate: T,
    pub beta1: T,
    pub beta2: T,
    pub epsilon: T,
    pub weight_decay: T,
    /// State: Key -> (m, v, step)
    /// m and v are flat vectors so any parameter shape fits.
    state: HashMap<usize, (Vec<T>, Vec<T>, i32)>,
}

impl<T: FloatElem> AdamW<T> {
    /// Creates a new AdamW optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The learning rate ($\eta$).
    ///
    /// Defaults: `beta1 = 0.9`, `beta2 = 0.999`, `epsilon = 1e-8`, `weight_decay = 0.01`.
    pub fn new(learning_rate: T) -> Self {
        Self {
            learning_rate,
            beta1: elem_from_f64(0.9),
            beta2: elem_from_f64(0.999),
            epsilon: elem_from_f64(1e-8),
            weight_decay: elem_from_f64(0.01),
            state: HashMap::new(),
        }
    }

    pub fn with_betas(mut self, beta1: T, beta2: T) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_epsilon(mut self, epsilon: T) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: T) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Number of updates applied to the parameter with `key`.
    pub fn steps_taken(&self, key: usize) -> usize {
        self.state
            .get(&key)
            .map_or(0, |(_, _, step)| usize::try_from(*step).unwrap_or(0))
    }
}

impl<T: FloatElem> Optimizer<T> for AdamW<T> {
    fn update(&mut self, key: usize, param: &mut Tensor<T, 2>, grad: &Tensor<T, 2>) -> Result<()> {
        check_grad_shape(param, grad)?;

        let size = param.size();
        let (m, v, step) = self
            .state
            .entry(key)
            .or_insert_with(|| (vec![T::zero(); size], vec![T::zero(); size], 0));
        *step = step.saturating_add(1);

        let lr = self.learning_rate;
        let b1 = self.beta1;
        let b2 = self.beta2;
        let eps = self.epsilon;
        let lambda = self.weight_decay;
        let one = T::one();

        let bias_correction1 = one - b1.powi(*step);
        let bias_correction2 = one - b2.powi(*step);

        param
            .data_mut()
            .par_iter_mut()
            .zip(grad.data().par_iter())
            .zip(m.par_iter_mut())
            .zip(v.par_iter_mut())
            .for_each(|(((p, &g), m_elem), v_elem)| {
                *m_elem = b1 * *m_elem + (one - b1) * g;
                *v_elem = b2 * *v_elem + (one - b2) * g * g;

                let m_hat = *m_elem / bias_correction1;
                let v_hat = *v_elem / bias_correction2;

                *p = *p - lr * (m_hat / (v_hat.sqrt() + eps) + lambda * *p);
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
    fn test_adamw_new() {
        let adam = AdamW::<f32>::new(0.001);
        assert_eq!(adam.learning_rate, 0.001);
        assert_eq!(adam.beta1, 0.9);
        assert_eq!(adam.weight_decay, 0.01);
    }

    #[test]
    fn test_adamw_update() {
        let mut adam = AdamW::<f32>::new(0.1).with_weight_decay(0.0);
        let mut param = Tensor::new(vec![1.0], [1, 1]).unwrap();
        let grad = Tensor::new(vec![0.1], [1, 1]).unwrap();

        adam.update(0, &mut param, &grad).unwrap();

        // m_hat = 0.1, v_hat = 0.01
        // p = 1.0 - 0.1 * (0.1 / (sqrt(0.01) + 1e-8)) = 0.9
        let p = param.data()[0];
        assert!((p - 0.9).abs() < 1e-5, "Step 1 failed: p={}", p);

        // A constant gradient keeps m_hat / sqrt(v_hat) at 1.
        adam.update(0, &mut param, &grad).unwrap();
        assert!((param.data()[0] - 0.8).abs() < 1e-5);
        assert_eq!(adam.steps_taken(0), 2);
        assert_eq!(adam.steps_taken(1), 0);
    }

    #[test]
    fn test_adamw_weight_decay() {
        let mut adam = AdamW::<f64>::new(0.1).with_weight_decay(0.2);
        let mut param = Tensor::new(vec![1.0], [1, 1]).unwrap();
        let grad = Tensor::new(vec![0.0], [1, 1]).unwrap();
        adam.update(0, &mut param, &grad).unwrap();
        // Only the decoupled decay term moves the parameter.
        assert!((param.data()[0] - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_adamw_keeps_state_per_key() {
        let mut adam = AdamW::<f64>::new(0.1).with_weight_decay(0.0);
        let mut a = Tensor::new(vec![1.0], [1, 1]).unwrap();
        let mut b = Tensor::new(vec![1.0], [1, 1]).unwrap();
        let g = Tensor::new(vec![1.0], [1, 1]).unwrap();
        adam.update(0, &mut a, &g).unwrap();
        adam.update(0, &mut a, &g).unwrap();
        adam.update(1, &mut b, &g).unwrap();
        assert_eq!(adam.steps_taken(0), 2);
        assert_eq!(adam.steps_taken(1), 1);
    }

    #[test]
    fn test_adamw_learning_rate_accessors() {
        let mut adam = AdamW::<f32>::new(0.1);
        adam.set_learning_rate(0.05);
        assert_eq!(adam.learning_rate(), 0.05);
    }

    #[test]
    fn test_adamw_shape_mismatch() {
        let mut adam = AdamW::<f32>::new(0.1);
        let mut param = Tensor::<f32, 2>::zeros([1, 2]);
        let grad = Tensor::<f32, 2>::zeros([2, 1]);
        assert!(adam.update(0, &mut param, &grad).is_err());
    }
}
