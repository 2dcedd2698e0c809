//! Data-parallel contrastive training of a small dual encoder on synthetic image-text pairs.
//!
//! Each replica is a thread with its own model copy; replicas talk over a `CpuBackend` ring.
//!
//! ```text
//! cargo run -p clip-rs-demos --bin train_clip -- --world-size 2 --minibatch-size 4
//! CLIP_LOG=clip_rs=debug cargo run -p clip-rs-demos --bin train_clip
//! ```

use anyhow::{Context, Result, anyhow, ensure};
use clap::Parser;
use clip_rs::clip::{ClipArchitecture, ClipBatch, ClipTrainer, DualEncoder, TrainConfig};
use clip_rs::data::{DataLoader, DistributedSampler, ImageTextPair, PairCollate};
use clip_rs::distributed::{CollectiveBackend, CpuBackend};
use clip_rs::logging::init_tracing;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::thread;
use tracing::{info, info_span};

const SEQ_LEN: usize = 4;

#[derive(Debug, Parser)]
#[command(name = "train_clip")]
struct Args {
    /// Number of replicas, one thread each.
    #[arg(long, default_value_t = 2)]
    world_size: usize,

    /// Rows per mini-chunk; 0 disables chunking. Overrides the config file.
    #[arg(long)]
    minibatch_size: Option<usize>,

    #[arg(long, default_value_t = 30)]
    steps: usize,

    /// Pairs per replica per step.
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// JSON training config. A small built-in ViT-B/32 setup is used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn default_config() -> TrainConfig {
    TrainConfig {
        model_name: "ViT-B/32".into(),
        architecture: ClipArchitecture {
            image_dim: 32,
            hidden_dim: 64,
            embed_dim: 16,
            vocab_size: 32,
            text_width: 16,
            activation: Default::default(),
        },
        minibatch_size: 8,
        lr_restart_period: 2000,
    }
}

/// Pairs whose image is a noisy template of a class and whose caption names the same class.
fn synthetic_pairs(arch: &ClipArchitecture, count: usize, seed: u64) -> Vec<ImageTextPair<f32>> {
    let classes = arch.vocab_size / 2;
    let mut rng = StdRng::seed_from_u64(seed);
    let templates: Vec<Vec<f32>> = (0..classes)
        .map(|_| (0..arch.image_dim).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect();

    (0..count)
        .map(|_| {
            let class = rng.random_range(0..classes);
            let image = templates[class]
                .iter()
                .map(|v| v + rng.random_range(-0.1..0.1))
                .collect();
            // Class token followed by filler tokens from the upper half of the vocabulary.
            let tokens = std::iter::once(class)
                .chain((1..SEQ_LEN).map(|_| classes + rng.random_range(0..arch.vocab_size - classes)))
                .collect();
            ImageTextPair { image, tokens }
        })
        .collect()
}

fn run_replica(
    backend: CpuBackend,
    config: TrainConfig,
    dataset: Vec<ImageTextPair<f32>>,
    validation: ClipBatch<f32>,
    args: &Args,
) -> Result<()> {
    let rank = backend.rank();
    let world_size = backend.world_size();
    let _span = info_span!("replica", rank).entered();

    // Same seed everywhere so replicas start identical.
    let model = DualEncoder::<f32>::new(&config.architecture, &mut StdRng::seed_from_u64(args.seed))?;
    let mut trainer = ClipTrainer::from_config(model, &config, backend)?;

    let mut epoch = 0u64;
    while trainer.steps() < args.steps {
        let loader = DataLoader::<_, _, PairCollate<f32>>::with_collate(dataset.clone(), args.batch_size)
            .with_sampler(DistributedSampler::new(rank, world_size).with_shuffle_seed(args.seed + epoch))
            .drop_last(true);
        if loader.num_batches() == 0 {
            return Err(anyhow!("dataset too small for one batch per replica"));
        }
        for batch in loader.iter() {
            if trainer.steps() >= args.steps {
                break;
            }
            trainer.training_step(&batch?)?;
        }
        epoch += 1;
    }

    // The backend moved into the trainer; it still knows which replica this is.
    if trainer.backend().rank() == 0 {
        let metrics = trainer.validation_step(&validation)?;
        info!(loss = metrics.loss, accuracy = metrics.accuracy, "validation");
        println!("{}", serde_json::to_string(&metrics)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrainConfig::from_path(path).with_context(|| format!("loading {}", path.display()))?,
        None => default_config(),
    };
    if let Some(m) = args.minibatch_size {
        config.minibatch_size = m;
    }
    ensure!(
        config.architecture.vocab_size >= 2,
        "synthetic captions need a vocabulary of at least 2 tokens"
    );
    let world_size = args.world_size.max(1);
    info!(
        model = %config.model_name,
        world_size,
        batch_size = args.batch_size,
        minibatch_size = config.minibatch_size,
        steps = args.steps,
        "starting"
    );

    let dataset = synthetic_pairs(&config.architecture, world_size * args.batch_size * 8, args.seed);
    let validation = DataLoader::<_, _, PairCollate<f32>>::with_collate(
        synthetic_pairs(&config.architecture, args.batch_size, args.seed + 1),
        args.batch_size,
    )
    .iter()
    .next()
    .ok_or_else(|| anyhow!("empty validation set"))??;

    thread::scope(|scope| {
        let handles: Vec<_> = CpuBackend::ring(world_size)
            .into_iter()
            .map(|backend| {
                let config = config.clone();
                let dataset = dataset.clone();
                let validation = validation.clone();
                let args = &args;
                scope.spawn(move || run_replica(backend, config, dataset, validation, args))
            })
            .collect();

        handles
            .into_iter()
            .try_for_each(|h| h.join().map_err(|_| anyhow!("replica panicked"))?)
    })
}
