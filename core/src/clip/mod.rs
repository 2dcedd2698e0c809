//! # Contrastive image-text training (CLIP)
//!
//! A CLIP model embeds images and texts into one space and learns to score the matching pair
//! of every row above all mismatched pairs. For a batch of `N` pairs the logit matrix is
//!
//! $$ L = e^{s} \cdot \hat{I} \hat{T}^\top $$
//!
//! with L2-normalised embeddings $\hat{I}, \hat{T}$ and learned log-temperature $s$, and the
//! loss is the mean of the row-wise and column-wise cross-entropy against the identity.
//!
//! ## Memory-bounded steps
//!
//! The loss couples every image with every text, so a naive backward pass keeps the activations
//! of the whole batch alive. [`ClipTrainer`] instead:
//!
//! 1. embeds everything once **without** gradients and all-gathers the result;
//! 2. re-embeds one mini-chunk at a time **with** gradients, scoring it against the gathered,
//!    detached embeddings of the other modality, and backpropagates immediately.
//!
//! For the differentiated direction the chunk losses add up to the full-batch loss, while only
//! one chunk's graph is alive at a time.
//!
//! ```rust
//! use clip_rs::clip::{ClipArchitecture, ClipBatch, ClipTrainer, DualEncoder};
//! use clip_rs::distributed::SingleProcess;
//! use clip_rs::optim::{ConstantLR, Sgd};
//! use clip_rs::tensor::Tensor;
//! use rand::SeedableRng;
//!
//! let arch = ClipArchitecture {
//!     image_dim: 6, hidden_dim: 8, embed_dim: 4, vocab_size: 10, text_width: 4,
//!     activation: Default::default(),
//! };
//! let model = DualEncoder::<f64>::new(&arch, &mut rand::rngs::StdRng::seed_from_u64(0)).unwrap();
//! let mut trainer = ClipTrainer::new(model, Sgd::new(0.1), ConstantLR(0.1), SingleProcess, 2);
//!
//! let batch = ClipBatch::new(
//!     Tensor::new((0..24).map(|i| i as f64 / 24.0).collect(), [4, 6]).unwrap(),
//!     Tensor::new(vec![1, 2, 3, 4, 5, 6, 7, 8], [4, 2]).unwrap(),
//! ).unwrap();
//! let metrics = trainer.training_step(&batch).unwrap();
//! assert_eq!(metrics.chunks, 2);
//! assert!(metrics.logit_scale <= 100f64.ln());
//! ```

pub mod batch;
pub mod chunk;
pub mod config;
pub mod encoder;
pub mod metrics;
pub mod model;
pub mod trainer;

pub use batch::ClipBatch;
pub use chunk::{chunk_count, chunk_ranges, ground_truth, ground_truth_offset};
pub use config::TrainConfig;
pub use encoder::{ContrastiveEncoder, max_logit_scale};
pub use metrics::{StepMetrics, ValidationMetrics};
pub use model::{ClipArchitecture, DualEncoder, initial_logit_scale};
pub use trainer::{ClipTrainer, GradientReport};
