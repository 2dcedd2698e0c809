use crate::tensor::FloatElem;
use serde::Serialize;

/// What one training step reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepMetrics<T: FloatElem> {
    /// Symmetric contrastive loss of the statistics pass over the gathered batch.
    pub loss: T,
    /// Top-1 text-to-image accuracy of the statistics pass.
    pub accuracy: T,
    /// Chunk-size-weighted mean of the image-direction chunk losses.
    pub image_loss: T,
    /// Chunk-size-weighted mean of the text-direction chunk losses.
    pub text_loss: T,
    /// Mini-chunks per modality on this replica.
    pub chunks: usize,
    /// Rows of the gathered batch (`N * world_size`).
    pub global_batch: usize,
    /// Learning rate for the next step.
    pub learning_rate: T,
    /// Log-temperature after the clamp.
    pub logit_scale: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidationMetrics<T: FloatElem> {
    pub loss: T,
    pub accuracy: T,
}
