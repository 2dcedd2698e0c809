//! # Distributed Training
//!
//! Contrastive training is data parallel: every replica holds a full copy of both encoders and
//! a different slice of the global batch. Two collectives tie the replicas together.
//!
//! 1.  **All-Gather** (statistics pass): every replica contributes its normalised embeddings and
//!     receives everyone's, concatenated **in rank order**. Row `rank * N + i` of the global
//!     matrix is local row `i` of replica `rank`, which is what the ground-truth offsets rely on.
//! 2.  **All-Reduce** (before the optimizer step): accumulated gradients are summed across
//!     replicas and averaged, so all replicas apply the same update and stay identical.
//!
//! ## Module Contents
//!
//! *   [`CollectiveBackend`]: the interface the training step talks to.
//! *   [`SingleProcess`]: world size 1. Both collectives return their input.
//! *   [`CpuBackend`]: replicas as threads, connected in a ring of `crossbeam` channels.
//!     [`CpuBackend::ring`] builds a wired set.

pub mod backend;
pub mod cpu_backend;

pub use backend::{CollectiveBackend, SingleProcess};
pub use cpu_backend::CpuBackend;
