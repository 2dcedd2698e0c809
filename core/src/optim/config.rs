//! Optimizer hyperparameters per model family.

use super::AdamW;
use crate::tensor::{FloatElem, elem_from_f64};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Base learning rates by model name.
const LEARNING_RATES: &[(&str, f64)] = &[
    ("RN50", 5e-4),
    ("RN101", 5e-4),
    ("RN50x4", 5e-4),
    ("RN50x16", 4e-4),
    ("RN50x64", 3.6e-4),
    ("ViT-B/32", 5e-4),
    ("ViT-B/16", 5e-4),
    ("ViT-L/14", 4e-4),
    ("ViT-L/14-336px", 2e-5),
];

/// AdamW hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
}

impl OptimizerConfig {
    /// Looks up the hyperparameters for a named model.
    ///
    /// Vision-transformer models (names containing `ViT`) use `beta2 = 0.98` and `eps = 1e-6`;
    /// ResNets use `0.999` and `1e-8`. Weight decay is 0.2 for all of them.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownModel` if the name is not in the table.
    pub fn for_model(name: &str) -> Result<Self> {
        let learning_rate = LEARNING_RATES
            .iter()
            .find(|(model, _)| *model == name)
            .map(|&(_, lr)| lr)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))?;

        let vit = name.contains("ViT");
        Ok(Self {
            learning_rate,
            beta1: 0.9,
            beta2: if vit { 0.98 } else { 0.999 },
            epsilon: if vit { 1e-6 } else { 1e-8 },
            weight_decay: 0.2,
        })
    }

    /// Names accepted by [`OptimizerConfig::for_model`].
    pub fn known_models() -> impl Iterator<Item = &'static str> {
        LEARNING_RATES.iter().map(|(name, _)| *name)
    }

    pub fn build<T: FloatElem>(&self) -> AdamW<T> {
        AdamW::new(elem_from_f64(self.learning_rate))
            .with_betas(elem_from_f64(self.beta1), elem_from_f64(self.beta2))
            .with_epsilon(elem_from_f64(self.epsilon))
            .with_weight_decay(elem_from_f64(self.weight_decay))
    }
}
