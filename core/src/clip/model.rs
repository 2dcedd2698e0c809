use super::encoder::ContrastiveEncoder;
use crate::autograd::{GradMode, Variable};
use crate::nn::{Activation, Embedding, Linear, Module, Parameter};
use crate::tensor::{FloatElem, Tensor, elem_from_f64};
use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Initial log-temperature, `ln(1 / 0.07)`.
pub fn initial_logit_scale() -> f64 {
    (1.0f64 / 0.07).ln()
}

/// Sizes of the two towers of a [`DualEncoder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipArchitecture {
    /// Width of a flattened input image.
    pub image_dim: usize,
    /// Hidden width of the image tower.
    pub hidden_dim: usize,
    /// Width of the shared embedding space.
    pub embed_dim: usize,
    pub vocab_size: usize,
    /// Width of the token embeddings before projection.
    pub text_width: usize,
    #[serde(default)]
    pub activation: Activation,
}

impl ClipArchitecture {
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if any width is zero.
    pub fn validate(&self) -> Result<()> {
        let widths = [
            ("image_dim", self.image_dim),
            ("hidden_dim", self.hidden_dim),
            ("embed_dim", self.embed_dim),
            ("vocab_size", self.vocab_size),
            ("text_width", self.text_width),
        ];
        match widths.iter().find(|(_, w)| *w == 0) {
            Some((name, _)) => Err(Error::InvalidConfig(format!("{name} must be positive"))),
            None => Ok(()),
        }
    }
}

/// The reference two-tower model.
///
/// - Image tower: `Linear(image_dim, hidden_dim) -> activation -> Linear(hidden_dim, embed_dim)`
/// - Text tower: `Embedding(vocab_size, text_width)`, mean over tokens, `Linear(text_width, embed_dim)`
/// - A learned `[1, 1]` log-temperature initialised to `ln(1 / 0.07)`.
#[derive(Debug)]
pub struct DualEncoder<T: FloatElem> {
    image_hidden: Linear<T>,
    image_proj: Linear<T>,
    activation: Activation,
    token_embedding: Embedding<T>,
    text_proj: Linear<T>,
    logit_scale: Parameter<T>,
}

impl<T: FloatElem> DualEncoder<T> {
    /// Builds a randomly initialised model.
    ///
    /// Replicas that must start identical should pass identically seeded generators.
    pub fn new(arch: &ClipArchitecture, rng: &mut impl Rng) -> Result<Self> {
        arch.validate()?;
        Ok(Self {
            image_hidden: Linear::init(arch.image_dim, arch.hidden_dim, rng),
            image_proj: Linear::init(arch.hidden_dim, arch.embed_dim, rng),
            activation: arch.activation,
            token_embedding: Embedding::init(arch.vocab_size, arch.text_width, rng),
            text_proj: Linear::init(arch.text_width, arch.embed_dim, rng),
            logit_scale: Variable::new(Tensor::full([1, 1], elem_from_f64(initial_logit_scale()))),
        })
    }

    pub fn embed_dim(&self) -> usize {
        self.image_proj.out_features()
    }
}

impl<T: FloatElem> ContrastiveEncoder for DualEncoder<T> {
    type Elem = T;

    fn encode_image(&self, images: &Tensor<T, 2>, mode: GradMode) -> Result<Variable<T, 2>> {
        let x = Variable::constant(images.clone());
        let hidden = self.activation.apply(&self.image_hidden.forward(&x, mode)?);
        Ok(self.image_proj.forward(&hidden, mode)?)
    }

    fn encode_text(&self, texts: &Tensor<usize, 2>, mode: GradMode) -> Result<Variable<T, 2>> {
        let pooled = self.token_embedding.forward_mean(texts, mode)?;
        Ok(self.text_proj.forward(&pooled, mode)?)
    }

    fn logit_scale_param(&self) -> &Parameter<T> {
        &self.logit_scale
    }

    fn logit_scale_param_mut(&mut self) -> &mut Parameter<T> {
        &mut self.logit_scale
    }

    fn parameters(&self) -> Vec<&Parameter<T>> {
        let mut params = self.image_hidden.parameters();
        params.extend(self.image_proj.parameters());
        params.extend(self.token_embedding.parameters());
        params.extend(self.text_proj.parameters());
        params.push(&self.logit_scale);
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter<T>> {
        let mut params = self.image_hidden.parameters_mut();
        params.extend(self.image_proj.parameters_mut());
        params.extend(self.token_embedding.parameters_mut());
        params.extend(self.text_proj.parameters_mut());
        params.push(&mut self.logit_scale);
        params
    }
}
