use clip_rs::autograd::{GradMode, Variable};
use clip_rs::clip::{
    ClipArchitecture, ClipBatch, ClipTrainer, ContrastiveEncoder, DualEncoder, chunk_ranges, ground_truth,
    ground_truth_offset, max_logit_scale,
};
use clip_rs::distributed::{CpuBackend, SingleProcess};
use clip_rs::loss;
use clip_rs::nn::Parameter;
use clip_rs::optim::{ConstantLR, Sgd};
use clip_rs::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::thread;

const EPS: f64 = 1e-12;

fn arch() -> ClipArchitecture {
    ClipArchitecture {
        image_dim: 5,
        hidden_dim: 7,
        embed_dim: 4,
        vocab_size: 12,
        text_width: 6,
        activation: Default::default(),
    }
}

fn model(seed: u64) -> DualEncoder<f64> {
    DualEncoder::new(&arch(), &mut StdRng::seed_from_u64(seed)).unwrap()
}

fn trainer<E: ContrastiveEncoder<Elem = f64>>(
    model: E,
    lr: f64,
    minibatch_size: usize,
) -> ClipTrainer<E, Sgd<f64>, SingleProcess> {
    ClipTrainer::new(model, Sgd::new(lr), ConstantLR(lr as f32), SingleProcess, minibatch_size)
}

/// Deterministic pairs; `start` shifts the pattern so that halves of a batch differ.
fn batch(start: usize, n: usize) -> ClipBatch<f64> {
    let images = (start * 5..(start + n) * 5)
        .map(|i| ((i * 7 % 11) as f64 / 11.0) - 0.4)
        .collect();
    let texts = (start * 3..(start + n) * 3).map(|i| (i * 5) % 12).collect();
    ClipBatch::new(
        Tensor::new(images, [n, 5]).unwrap(),
        Tensor::new(texts, [n, 3]).unwrap(),
    )
    .unwrap()
}

fn grads<E: ContrastiveEncoder<Elem = f64>>(model: &E) -> Vec<Tensor<f64, 2>> {
    model.parameters().iter().map(|p| p.grad().unwrap()).collect()
}

fn assert_close(a: &Tensor<f64, 2>, b: &Tensor<f64, 2>, tol: f64) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.data().iter().zip(b.data()) {
        assert!((x - y).abs() < tol, "{x} vs {y}");
    }
}

#[test]
fn test_statistics_loss_is_symmetric_cross_entropy() {
    let mut t = trainer(model(1), 0.0, 0);
    let b = batch(0, 6);

    let (per_image, per_text) = t.model().forward(&b.images, &b.texts).unwrap();
    let targets = ground_truth(0, 6);
    let image_ce = loss::cross_entropy(&per_image, &targets).unwrap();
    let text_ce = loss::cross_entropy(&per_text, &targets).unwrap();

    // accuracy = mean(argmax(logits, axis 0) == i)
    let hits = per_image
        .argmax_axis0()
        .iter()
        .enumerate()
        .filter(|(i, a)| i == *a)
        .count();

    let report = t.compute_gradients(&b).unwrap();
    assert!((report.loss - (image_ce + text_ce) / 2.0).abs() < 1e-10);
    assert!((report.accuracy - hits as f64 / 6.0).abs() < 1e-12);
    assert_eq!(report.global_batch, 6);
}

#[test]
fn test_chunking_keeps_losses_and_scales_gradients() {
    let n = 4;
    let m = 2;
    let b = batch(0, n);

    let mut whole = trainer(model(2), 0.0, 0);
    let mut chunked = trainer(model(2), 0.0, m);
    let r_whole = whole.compute_gradients(&b).unwrap();
    let r_chunked = chunked.compute_gradients(&b).unwrap();

    assert_eq!(r_whole.chunks, 1);
    assert_eq!(r_chunked.chunks, 2);
    assert!((r_whole.loss - r_chunked.loss).abs() < 1e-12);
    assert!((r_whole.image_loss - r_chunked.image_loss).abs() < 1e-10);
    assert!((r_whole.text_loss - r_chunked.text_loss).abs() < 1e-10);

    // Chunk losses are means over M rows and their gradients are summed.
    let factor = (n / m) as f64;
    for (g_whole, g_chunked) in grads(whole.model()).iter().zip(grads(chunked.model())) {
        assert_close(&g_whole.scale(factor), &g_chunked, 1e-9);
    }
}

#[test]
fn test_logit_scale_never_exceeds_bound() {
    let mut t = trainer(model(3), 50.0, 2);
    let b = batch(0, 4);
    for _ in 0..20 {
        let metrics = t.training_step(&b).unwrap();
        assert!(metrics.logit_scale <= max_logit_scale());
        assert!(t.model().logit_scale_value() <= max_logit_scale());
    }

    t.model_mut().logit_scale_param_mut().data.data_mut()[0] = 10.0;
    t.training_step(&b).unwrap();
    assert!(t.model().logit_scale_value() <= max_logit_scale());
}

/// Maps image `i` (one-hot) and token `i` to the same basis vector.
#[derive(Debug)]
struct MatchedEncoder {
    projection: Parameter<f64>,
    logit_scale: Parameter<f64>,
}

impl MatchedEncoder {
    fn new(dim: usize) -> Self {
        let mut identity = vec![0.0; dim * dim];
        for i in 0..dim {
            identity[i * dim + i] = 1.0;
        }
        Self {
            projection: Variable::new(Tensor::new(identity, [dim, dim]).unwrap()),
            logit_scale: Variable::new(Tensor::full([1, 1], max_logit_scale())),
        }
    }
}

impl ContrastiveEncoder for MatchedEncoder {
    type Elem = f64;

    fn encode_image(&self, images: &Tensor<f64, 2>, mode: GradMode) -> clip_rs::Result<Variable<f64, 2>> {
        Ok(Variable::constant(images.clone()).matmul(&self.projection.track(mode))?)
    }

    fn encode_text(&self, texts: &Tensor<usize, 2>, mode: GradMode) -> clip_rs::Result<Variable<f64, 2>> {
        Ok(self.projection.track(mode).embedding_mean(texts)?)
    }

    fn logit_scale_param(&self) -> &Parameter<f64> {
        &self.logit_scale
    }

    fn logit_scale_param_mut(&mut self) -> &mut Parameter<f64> {
        &mut self.logit_scale
    }

    fn parameters(&self) -> Vec<&Parameter<f64>> {
        vec![&self.projection, &self.logit_scale]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter<f64>> {
        vec![&mut self.projection, &mut self.logit_scale]
    }
}

#[test]
fn test_perfectly_matched_batch() {
    let n = 4;
    let mut one_hot = vec![0.0; n * n];
    for i in 0..n {
        one_hot[i * n + i] = 1.0;
    }
    let b = ClipBatch::new(
        Tensor::new(one_hot, [n, n]).unwrap(),
        Tensor::new((0..n).collect(), [n, 1]).unwrap(),
    )
    .unwrap();

    let mut t = trainer(MatchedEncoder::new(n), 0.0, 2);
    let validation = t.validation_step(&b).unwrap();
    assert!(validation.loss < 1e-6);
    assert_eq!(validation.accuracy, 1.0);

    let metrics = t.training_step(&b).unwrap();
    assert!(metrics.loss < 1e-6);
    assert_eq!(metrics.accuracy, 1.0);
    assert_eq!(metrics.chunks, 2);
}

#[test]
fn test_single_replica_matches_direct_computation() {
    let b = batch(3, 5);
    let mut t = trainer(model(4), 0.0, 0);
    let report = t.compute_gradients(&b).unwrap();
    let trained = grads(t.model());

    // Same thing by hand, one graph per direction with the other modality held constant.
    let reference = model(4);
    let targets = ground_truth(0, 5);
    let embed = |direction: usize, mode: GradMode| {
        let raw = if direction == 0 {
            reference.encode_image(&b.images, mode)
        } else {
            reference.encode_text(&b.texts, mode)
        };
        raw.unwrap().l2_normalize_rows(EPS).unwrap()
    };
    let direction_loss = |direction: usize| {
        let other = embed(1 - direction, GradMode::Disabled);
        let scale = reference.logit_scale(GradMode::Enabled).exp();
        let loss = embed(direction, GradMode::Enabled)
            .matmul(&other.transpose().unwrap())
            .unwrap()
            .scale_by(&scale)
            .unwrap()
            .cross_entropy(&targets)
            .unwrap();
        loss.backward().unwrap();
        loss
    };
    let image_loss = direction_loss(0);
    let text_loss = direction_loss(1);

    assert!((report.loss - (image_loss.item() + text_loss.item()) / 2.0).abs() < 1e-10);
    assert!((report.image_loss - image_loss.item()).abs() < 1e-10);
    assert!((report.text_loss - text_loss.item()).abs() < 1e-10);
    for (expected, got) in grads(&reference).iter().zip(&trained) {
        assert_close(expected, got, 1e-10);
    }
}

#[test]
fn test_two_chunks_of_two() {
    let ranges = chunk_ranges(4, 2);
    assert_eq!(ranges, vec![0..2, 2..4]);
    let targets: Vec<Vec<usize>> = ranges
        .iter()
        .enumerate()
        .map(|(j, r)| ground_truth(ground_truth_offset(0, 4, j, 2), r.len()))
        .collect();
    assert_eq!(targets, vec![vec![0, 1], vec![2, 3]]);

    // Replica 1 of 2 continues after replica 0's rows.
    assert_eq!(ground_truth_offset(1, 4, 0, 2), 4);
    assert_eq!(ground_truth_offset(1, 4, 1, 2), 6);
}

#[test]
fn test_two_replicas_agree_with_single_process() {
    let local = 3;
    let handles: Vec<_> = CpuBackend::ring(2)
        .into_iter()
        .enumerate()
        .map(|(rank, backend)| {
            thread::spawn(move || {
                let mut t = ClipTrainer::new(model(6), Sgd::new(0.0), ConstantLR(0.0), backend, 2);
                let report = t.compute_gradients(&batch(rank * local, local)).unwrap();
                (report, grads(t.model()))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // The single process sees both replicas' batches back to back.
    let concatenated = ClipBatch::concat(&[batch(0, local), batch(local, local)]).unwrap();
    assert_eq!(concatenated.len(), 2 * local);
    let mut reference = trainer(model(6), 0.0, 0);
    let full = reference.compute_gradients(&concatenated).unwrap();
    let reference_grads = grads(reference.model());

    for (report, replica_grads) in &results {
        assert_eq!(report.global_batch, 2 * local);
        assert!((report.loss - full.loss).abs() < 1e-12);
        assert!((report.accuracy - full.accuracy).abs() < 1e-12);
        assert_eq!(report.chunks, 2);
        assert_eq!(replica_grads.len(), reference_grads.len());
    }
    // The all-reduce leaves every replica with the same gradients.
    assert_eq!(results[0].1, results[1].1);
}

#[test]
fn test_averaged_replica_gradients_match_concatenated_batch() {
    let local = 2;
    let handles: Vec<_> = CpuBackend::ring(2)
        .into_iter()
        .enumerate()
        .map(|(rank, backend)| {
            thread::spawn(move || {
                let mut t = ClipTrainer::new(model(7), Sgd::new(0.0), ConstantLR(0.0), backend, 0);
                t.compute_gradients(&batch(rank * local, local)).unwrap();
                grads(t.model())
            })
        })
        .collect();
    let replica_grads: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut reference = trainer(model(7), 0.0, 0);
    reference.compute_gradients(&batch(0, 2 * local)).unwrap();

    for replica in &replica_grads {
        for (expected, got) in grads(reference.model()).iter().zip(replica) {
            assert_close(expected, got, 1e-10);
        }
    }
}

#[test]
fn test_replicas_stay_identical_after_steps() {
    let handles: Vec<_> = CpuBackend::ring(2)
        .into_iter()
        .enumerate()
        .map(|(rank, backend)| {
            thread::spawn(move || {
                let mut t = ClipTrainer::new(model(8), Sgd::new(0.5), ConstantLR(0.5), backend, 1);
                for step in 0..3 {
                    t.training_step(&batch(rank * 2 + step, 2)).unwrap();
                }
                t.model()
                    .parameters()
                    .iter()
                    .map(|p| p.data.clone())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let params: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(params[0], params[1]);
}
