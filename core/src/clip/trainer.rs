//! The contrastive training and validation steps.

use super::batch::ClipBatch;
use super::chunk::{chunk_ranges, chunk_size, ground_truth, ground_truth_offset};
use super::config::TrainConfig;
use super::encoder::{ContrastiveEncoder, NORMALIZE_EPS, max_logit_scale};
use super::metrics::{StepMetrics, ValidationMetrics};
use crate::autograd::{GradMode, Variable};
use crate::distributed::CollectiveBackend;
use crate::loss;
use crate::optim::{AdamW, CosineAnnealingWarmRestarts, LRScheduler, Optimizer};
use crate::tensor::{Tensor, elem_from_f64, elem_from_usize};
use crate::{Error, Result};
use num_traits::{Float, One, Zero};
use tracing::{debug, info, warn};

/// Which encoder a gradient pass differentiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Image,
    Text,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Image => "image",
            Direction::Text => "text",
        }
    }
}

/// Globally gathered, normalised, detached embeddings from the statistics pass.
struct Statistics<T: crate::tensor::FloatElem> {
    images: Tensor<T, 2>,
    texts: Tensor<T, 2>,
    loss: T,
    accuracy: T,
}

/// Gradients accumulated by [`ClipTrainer::compute_gradients`], before any update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientReport<T> {
    pub loss: T,
    pub accuracy: T,
    pub image_loss: T,
    pub text_loss: T,
    pub chunks: usize,
    pub global_batch: usize,
}

/// Drives one replica of data-parallel contrastive training.
///
/// Per step:
/// 1. split the local batch into mini-chunks;
/// 2. statistics pass without gradients: embed every chunk, all-gather the embeddings in rank
///    order, report the symmetric loss and accuracy;
/// 3. image pass: per chunk, re-embed the images with gradients and take the loss against all
///    (detached) text embeddings;
/// 4. text pass: the same against all image embeddings;
/// 5. average gradients across replicas;
/// 6. optimizer step, schedule step, clamp `logit_scale` to `ln(100)`.
///
/// Only one chunk's graph is alive at a time.
pub struct ClipTrainer<E, O, B>
where
    E: ContrastiveEncoder,
{
    model: E,
    optimizer: O,
    scheduler: Box<dyn LRScheduler + Send>,
    backend: B,
    minibatch_size: usize,
    step: usize,
}

impl<E, B> ClipTrainer<E, AdamW<E::Elem>, B>
where
    E: ContrastiveEncoder,
    B: CollectiveBackend,
{
    /// AdamW with the model's table entry and cosine warm restarts, as configured.
    pub fn from_config(model: E, config: &TrainConfig, backend: B) -> Result<Self> {
        config.validate()?;
        let opt = config.optimizer()?;
        let scheduler = CosineAnnealingWarmRestarts::new(opt.learning_rate as f32, config.lr_restart_period);
        Ok(Self::new(model, opt.build(), scheduler, backend, config.minibatch_size))
    }
}

impl<E, O, B> ClipTrainer<E, O, B>
where
    E: ContrastiveEncoder,
    O: Optimizer<E::Elem>,
    B: CollectiveBackend,
{
    /// The optimizer's learning rate is reset to the schedule's value at step 0.
    pub fn new(
        model: E,
        mut optimizer: O,
        scheduler: impl LRScheduler + Send + 'static,
        backend: B,
        minibatch_size: usize,
    ) -> Self {
        optimizer.set_learning_rate(elem_from_f64(f64::from(scheduler.get_lr(0))));
        Self {
            model,
            optimizer,
            scheduler: Box::new(scheduler),
            backend,
            minibatch_size,
            step: 0,
        }
    }

    pub fn model(&self) -> &E {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut E {
        &mut self.model
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Completed optimizer steps.
    pub fn steps(&self) -> usize {
        self.step
    }

    /// Runs one full training step on this replica's batch.
    ///
    /// Every replica must call this with a batch of the same size; the collectives inside are
    /// barriers.
    ///
    /// # Errors
    ///
    /// `Error::EmptyBatch` for an empty batch; otherwise any encoder, collective or optimizer
    /// failure, after which the parameters may be partially updated.
    pub fn training_step(&mut self, batch: &ClipBatch<E::Elem>) -> Result<StepMetrics<E::Elem>> {
        let report = self.compute_gradients(batch)?;

        for (key, param) in self.model.parameters_mut().into_iter().enumerate() {
            if let Some(grad) = param.grad() {
                self.optimizer.update(key, &mut param.data, &grad)?;
            }
        }
        self.model.zero_grad();

        self.step += 1;
        let lr = elem_from_f64(f64::from(self.scheduler.get_lr(self.step)));
        self.optimizer.set_learning_rate(lr);

        let bound = elem_from_f64(max_logit_scale());
        if let Some(previous) = self.model.clamp_logit_scale(bound) {
            warn!(
                rank = self.backend.rank(),
                previous = ?previous,
                bound = ?bound,
                "logit_scale clamped"
            );
        }

        let metrics = StepMetrics {
            loss: report.loss,
            accuracy: report.accuracy,
            image_loss: report.image_loss,
            text_loss: report.text_loss,
            chunks: report.chunks,
            global_batch: report.global_batch,
            learning_rate: lr,
            logit_scale: self.model.logit_scale_value(),
        };
        info!(
            rank = self.backend.rank(),
            step = self.step,
            loss = ?metrics.loss,
            accuracy = ?metrics.accuracy,
            lr = ?metrics.learning_rate,
            logit_scale = ?metrics.logit_scale,
            "training step"
        );
        Ok(metrics)
    }

    /// Steps 1-5 of a training step: statistics, both gradient passes and the cross-replica
    /// gradient average. Gradients are left on the parameters; nothing is updated.
    ///
    /// Each chunk's loss is the mean over its own rows and chunk gradients are summed, so with
    /// `k` equal chunks the accumulated gradient is `k` times that of a single chunk.
    pub fn compute_gradients(&mut self, batch: &ClipBatch<E::Elem>) -> Result<GradientReport<E::Elem>> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let n = batch.len();
        let ranges = chunk_ranges(n, self.minibatch_size);
        let chunks = ranges
            .iter()
            .map(|r| batch.slice(r.clone()))
            .collect::<Result<Vec<_>>>()?;

        let stats = self.statistics(&chunks)?;

        self.model.zero_grad();
        let image_loss = self.gradient_pass(Direction::Image, &chunks, &stats.texts, n)?;
        let text_loss = self.gradient_pass(Direction::Text, &chunks, &stats.images, n)?;

        self.synchronize_gradients()?;

        Ok(GradientReport {
            loss: stats.loss,
            accuracy: stats.accuracy,
            image_loss,
            text_loss,
            chunks: chunks.len(),
            global_batch: stats.images.rows(),
        })
    }

    /// Full-batch loss and accuracy from [`ContrastiveEncoder::forward`]. No chunking, no
    /// gather, no gradients; parameters are untouched.
    pub fn validation_step(&self, batch: &ClipBatch<E::Elem>) -> Result<ValidationMetrics<E::Elem>> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let (image_logits, text_logits) = self.model.forward(&batch.images, &batch.texts)?;
        let targets = ground_truth(0, batch.len());
        let metrics = ValidationMetrics {
            loss: loss::contrastive_loss(&image_logits, &text_logits, &targets)?,
            accuracy: loss::accuracy(&image_logits, &targets)?,
        };
        debug!(rank = self.backend.rank(), loss = ?metrics.loss, "validation step");
        Ok(metrics)
    }

    fn statistics(&self, chunks: &[ClipBatch<E::Elem>]) -> Result<Statistics<E::Elem>> {
        let eps = elem_from_f64(NORMALIZE_EPS);
        let mut local_images = Vec::with_capacity(chunks.len());
        let mut local_texts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let img = self.model.encode_image(&chunk.images, GradMode::Disabled)?;
            let txt = self.model.encode_text(&chunk.texts, GradMode::Disabled)?;
            local_images.push(img.data.l2_normalize_rows(eps)?.0);
            local_texts.push(txt.data.l2_normalize_rows(eps)?.0);
        }
        let local_images = Tensor::concat_rows(&local_images)?;
        let local_texts = Tensor::concat_rows(&local_texts)?;

        let (images, texts) = if self.backend.world_size() > 1 {
            (
                Tensor::concat_rows(&self.backend.all_gather(&local_images)?)?,
                Tensor::concat_rows(&self.backend.all_gather(&local_texts)?)?,
            )
        } else {
            (local_images, local_texts)
        };

        let scale = self.model.logit_scale_value().exp();
        let logits = images.matmul(&texts.transpose()?)?.scale(scale);
        let targets = ground_truth(0, logits.rows());
        let loss = loss::contrastive_loss(&logits, &logits.transpose()?, &targets)?;
        let accuracy = loss::accuracy(&logits, &targets)?;

        Ok(Statistics {
            images,
            texts,
            loss,
            accuracy,
        })
    }

    /// Backpropagates every chunk of one direction against the detached embeddings of the
    /// other modality. Returns the chunk-size-weighted mean loss.
    fn gradient_pass(
        &self,
        direction: Direction,
        chunks: &[ClipBatch<E::Elem>],
        others: &Tensor<E::Elem, 2>,
        local_batch_size: usize,
    ) -> Result<E::Elem> {
        let eps = elem_from_f64(NORMALIZE_EPS);
        let rank = self.backend.rank();
        let nominal = chunk_size(local_batch_size, self.minibatch_size);
        let others_t = Variable::constant(others.transpose()?);

        let mut weighted = <E::Elem as Zero>::zero();
        for (j, chunk) in chunks.iter().enumerate() {
            let embeds = match direction {
                Direction::Image => self.model.encode_image(&chunk.images, GradMode::Enabled)?,
                Direction::Text => self.model.encode_text(&chunk.texts, GradMode::Enabled)?,
            };
            let scale = self.model.logit_scale(GradMode::Enabled).exp();
            let logits = embeds
                .l2_normalize_rows(eps)?
                .matmul(&others_t)?
                .scale_by(&scale)?;

            let offset = ground_truth_offset(rank, local_batch_size, j, nominal);
            let loss = logits.cross_entropy(&ground_truth(offset, chunk.len()))?;
            loss.backward()?;

            debug!(
                rank,
                direction = direction.as_str(),
                chunk = j,
                offset,
                loss = ?loss.item(),
                "chunk backward"
            );
            weighted = weighted + loss.item() * elem_from_usize::<E::Elem>(chunk.len())?;
        }
        Ok(weighted / elem_from_usize::<E::Elem>(local_batch_size)?)
    }

    /// Replaces every gradient by its mean over replicas.
    fn synchronize_gradients(&mut self) -> Result<()> {
        let world_size = self.backend.world_size();
        if world_size == 1 {
            return Ok(());
        }
        let inv = <E::Elem as One>::one() / elem_from_usize::<E::Elem>(world_size)?;
        for param in self.model.parameters() {
            // Every replica must join every all-reduce, so missing gradients count as zero.
            let grad = param.grad().unwrap_or_else(|| Tensor::zeros(*param.data.shape()));
            let summed = self.backend.all_reduce_sum(&grad)?;
            *param.grad.borrow_mut() = Some(summed.scale(inv));
        }
        Ok(())
    }
}
