use super::model::ClipArchitecture;
use crate::optim::OptimizerConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_restart_period() -> usize {
    2000
}

/// Training configuration.
///
/// ```rust
/// use clip_rs::clip::TrainConfig;
///
/// let cfg = TrainConfig::from_json_str(r#"{
///     "model_name": "ViT-B/32",
///     "architecture": {
///         "image_dim": 48, "hidden_dim": 32, "embed_dim": 16,
///         "vocab_size": 64, "text_width": 16
///     },
///     "minibatch_size": 8
/// }"#).unwrap();
/// assert_eq!(cfg.lr_restart_period, 2000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Selects the optimizer hyperparameters, see [`OptimizerConfig::for_model`].
    pub model_name: String,
    pub architecture: ClipArchitecture,
    /// Rows per mini-chunk; 0 disables chunking.
    #[serde(default)]
    pub minibatch_size: usize,
    /// First cycle length of the cosine schedule, in steps.
    #[serde(default = "default_restart_period")]
    pub lr_restart_period: usize,
}

impl TrainConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Checks the architecture, the model name and the schedule.
    pub fn validate(&self) -> Result<()> {
        self.architecture.validate()?;
        OptimizerConfig::for_model(&self.model_name)?;
        if self.lr_restart_period == 0 {
            return Err(Error::InvalidConfig("lr_restart_period must be positive".into()));
        }
        Ok(())
    }

    pub fn optimizer(&self) -> Result<OptimizerConfig> {
        OptimizerConfig::for_model(&self.model_name)
    }
}
