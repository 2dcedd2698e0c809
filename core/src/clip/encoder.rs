use crate::Result;
use crate::autograd::{GradMode, Variable};
use crate::nn::Parameter;
use crate::tensor::{FloatElem, Tensor, elem_from_f64};
use num_traits::Float;

/// Row norms are clamped to at least this before dividing.
pub const NORMALIZE_EPS: f64 = 1e-12;

/// Upper bound of the learned log-temperature: `ln(100)`.
pub fn max_logit_scale() -> f64 {
    100f64.ln()
}

/// A pair of encoders mapping images and texts into a shared embedding space, plus the learned
/// log-temperature that scales their similarities.
///
/// Implementors decide the architecture; the training step only relies on the methods here.
pub trait ContrastiveEncoder {
    type Elem: FloatElem;

    /// Encodes `[N, image_dim]` images into `[N, D]` (unnormalised) embeddings.
    fn encode_image(&self, images: &Tensor<Self::Elem, 2>, mode: GradMode) -> Result<Variable<Self::Elem, 2>>;

    /// Encodes `[N, seq_len]` token ids into `[N, D]` (unnormalised) embeddings.
    fn encode_text(&self, texts: &Tensor<usize, 2>, mode: GradMode) -> Result<Variable<Self::Elem, 2>>;

    /// The `[1, 1]` log-temperature parameter.
    fn logit_scale_param(&self) -> &Parameter<Self::Elem>;

    fn logit_scale_param_mut(&mut self) -> &mut Parameter<Self::Elem>;

    /// All parameters (including the log-temperature) in a stable order.
    fn parameters(&self) -> Vec<&Parameter<Self::Elem>>;

    /// Mutable access to all parameters, in the same order as [`ContrastiveEncoder::parameters`].
    fn parameters_mut(&mut self) -> Vec<&mut Parameter<Self::Elem>>;

    /// The log-temperature entered into a pass with the given mode.
    fn logit_scale(&self, mode: GradMode) -> Variable<Self::Elem, 2> {
        self.logit_scale_param().track(mode)
    }

    /// Current value of the log-temperature.
    fn logit_scale_value(&self) -> Self::Elem {
        self.logit_scale_param().data.data()[0]
    }

    fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    /// Lowers the log-temperature to `max` if it exceeds it. Returns the previous value when it
    /// was lowered.
    fn clamp_logit_scale(&mut self, max: Self::Elem) -> Option<Self::Elem> {
        let value = &mut self.logit_scale_param_mut().data.data_mut()[0];
        if *value > max {
            let previous = *value;
            *value = max;
            Some(previous)
        } else {
            None
        }
    }

    /// Full-batch logits without gradient tracking: `(logits_per_image, logits_per_text)`.
    ///
    /// `logits_per_image[i][j]` is the scaled cosine similarity of image `i` and text `j`;
    /// `logits_per_text` is its transpose.
    fn forward(
        &self,
        images: &Tensor<Self::Elem, 2>,
        texts: &Tensor<usize, 2>,
    ) -> Result<(Tensor<Self::Elem, 2>, Tensor<Self::Elem, 2>)> {
        let eps = elem_from_f64(NORMALIZE_EPS);
        let image_embeds = self.encode_image(images, GradMode::Disabled)?.data.l2_normalize_rows(eps)?.0;
        let text_embeds = self.encode_text(texts, GradMode::Disabled)?.data.l2_normalize_rows(eps)?.0;

        let scale = self.logit_scale_value().exp();
        let logits_per_image = image_embeds.matmul(&text_embeds.transpose()?)?.scale(scale);
        let logits_per_text = logits_per_image.transpose()?;
        Ok((logits_per_image, logits_per_text))
    }
}
