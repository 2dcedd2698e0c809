//! Learning Rate Schedulers.

use std::f32::consts::PI;

/// A trait for learning rate schedulers.
pub trait LRScheduler {
    /// Calculates the learning rate for a given step.
    fn get_lr(&self, step: usize) -> f32;
}

/// A fixed learning rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantLR(pub f32);

impl LRScheduler for ConstantLR {
    fn get_lr(&self, _step: usize) -> f32 {
        self.0
    }
}

/// Cosine annealing with warm restarts (SGDR).
///
/// Within a cycle of length `T_i` the rate follows
/// `eta_min + (base_lr - eta_min) * (1 + cos(pi * T_cur / T_i)) / 2`, then jumps back to
/// `base_lr`. The first cycle lasts `t_0` steps and each following cycle is `t_mult` times
/// longer.
///
/// ```rust
/// use clip_rs::optim::{CosineAnnealingWarmRestarts, LRScheduler};
///
/// let schedule = CosineAnnealingWarmRestarts::new(1.0, 4);
/// assert_eq!(schedule.get_lr(0), 1.0);
/// assert!((schedule.get_lr(2) - 0.5).abs() < 1e-6);
/// assert_eq!(schedule.get_lr(4), 1.0); // restart
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CosineAnnealingWarmRestarts {
    pub base_lr: f32,
    pub eta_min: f32,
    pub t_0: usize,
    pub t_mult: usize,
}

impl CosineAnnealingWarmRestarts {
    /// A schedule with `t_mult = 1` and `eta_min = 0`. `t_0` is raised to at least 1.
    pub fn new(base_lr: f32, t_0: usize) -> Self {
        Self {
            base_lr,
            eta_min: 0.0,
            t_0: t_0.max(1),
            t_mult: 1,
        }
    }

    pub fn with_eta_min(mut self, eta_min: f32) -> Self {
        self.eta_min = eta_min;
        self
    }

    /// Cycle growth factor. Values below 1 are treated as 1.
    pub fn with_t_mult(mut self, t_mult: usize) -> Self {
        self.t_mult = t_mult.max(1);
        self
    }

    /// Position inside the current cycle and the cycle's length.
    fn cycle_position(&self, step: usize) -> (usize, usize) {
        if self.t_mult == 1 {
            return (step % self.t_0, self.t_0);
        }
        let mut t_cur = step;
        let mut t_i = self.t_0;
        while t_cur >= t_i {
            t_cur -= t_i;
            t_i = t_i.saturating_mul(self.t_mult);
        }
        (t_cur, t_i)
    }
}

impl LRScheduler for CosineAnnealingWarmRestarts {
    fn get_lr(&self, step: usize) -> f32 {
        let (t_cur, t_i) = self.cycle_position(step);
        let progress = t_cur as f32 / t_i as f32;
        self.eta_min + (self.base_lr - self.eta_min) * 0.5 * (1.0 + (progress * PI).cos())
    }
}
