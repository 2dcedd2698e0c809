use clip_rs::autograd::Variable;
use clip_rs::tensor::Tensor;

const H: f64 = 1e-6;

fn t(data: &[f64], shape: [usize; 2]) -> Tensor<f64, 2> {
    Tensor::new(data.to_vec(), shape).unwrap()
}

/// Compares the backward-pass gradient of `f` at `x` with central differences.
fn check_gradient<F>(x: Tensor<f64, 2>, f: F)
where
    F: Fn(&Variable<f64, 2>) -> Variable<f64, 0>,
{
    let var = Variable::new(x.clone());
    let y = f(&var);
    y.backward().unwrap();
    let analytic = var.grad().expect("gradient reached the input");
    assert_eq!(analytic.shape(), x.shape());

    for i in 0..x.size() {
        let mut plus = x.clone();
        plus.data_mut()[i] += H;
        let mut minus = x.clone();
        minus.data_mut()[i] -= H;
        let numeric = (f(&Variable::constant(plus)).item() - f(&Variable::constant(minus)).item()) / (2.0 * H);
        let got = analytic.data()[i];
        assert!(
            (numeric - got).abs() < 1e-5 * (1.0 + numeric.abs()),
            "element {i}: numeric {numeric}, analytic {got}"
        );
    }
}

#[test]
fn test_matmul_autograd() {
    // C = A @ B
    // A: [1, 2] = [1, 2]
    // B: [2, 1] = [3, 4]
    // C: [1, 1] = 1*3 + 2*4 = 3 + 8 = 11

    // dC/dA = B^T = [3, 4]
    // dC/dB = A^T = [1, 2]
    let a = Variable::new(t(&[1.0, 2.0], [1, 2]));
    let b = Variable::new(t(&[3.0, 4.0], [2, 1]));

    let c = a.matmul(&b).unwrap();
    assert_eq!(c.data.data()[0], 11.0);

    c.sum().backward().unwrap();

    assert_eq!(a.grad().unwrap().data(), &[3.0, 4.0]);
    assert_eq!(b.grad().unwrap().data(), &[1.0, 2.0]);
}

#[test]
fn test_matmul_exp_finite_difference() {
    let w = Variable::constant(t(&[0.3, -0.2, 0.1, 0.5, 0.4, -0.6], [2, 3]));
    check_gradient(t(&[0.5, -1.0, 0.25, 0.75], [2, 2]), |x| {
        x.matmul(&w).unwrap().exp().sum()
    });

    let a = Variable::constant(t(&[1.0, -2.0, 0.5, 0.3, 0.2, 0.1], [3, 2]));
    check_gradient(t(&[0.1, 0.2, -0.3, 0.4, 0.5, -0.6], [2, 3]), |x| {
        a.matmul(x).unwrap().cross_entropy(&[2, 0, 1]).unwrap()
    });
}

#[test]
fn test_transpose_relu_finite_difference() {
    let c = Variable::constant(t(&[1.0, -1.0, 0.5, 2.0, 0.25, -0.75], [3, 2]));
    // Entries kept away from the ReLU kink.
    check_gradient(t(&[0.8, -0.4, 1.2, -0.9, 0.3, 0.6], [3, 2]), |x| {
        x.transpose().unwrap().relu().matmul(&c).unwrap().cross_entropy(&[1, 0]).unwrap()
    });
}

#[test]
fn test_add_row_finite_difference() {
    let x = Variable::constant(t(&[0.1, 0.9, -0.3, 0.4, 0.0, 0.2], [2, 3]));
    check_gradient(t(&[0.5, -0.5, 0.25], [1, 3]), |bias| {
        x.add_row(bias).unwrap().cross_entropy(&[0, 2]).unwrap()
    });
}

#[test]
fn test_l2_normalize_finite_difference() {
    let other = Variable::constant(t(&[0.6, 0.8, 0.0, -1.0, 0.0, 0.0, 0.0, 0.6, 0.8], [3, 3]));
    check_gradient(t(&[1.0, 2.0, -0.5, 0.3, -0.1, 0.7], [2, 3]), |x| {
        x.l2_normalize_rows(1e-12)
            .unwrap()
            .matmul(&other.transpose().unwrap())
            .unwrap()
            .cross_entropy(&[0, 2])
            .unwrap()
    });
}

#[test]
fn test_scale_by_finite_difference() {
    let logits = Variable::constant(t(&[0.2, -0.1, 0.5, 0.3], [2, 2]));
    check_gradient(t(&[2.6592], [1, 1]), |log_scale| {
        logits.scale_by(&log_scale.exp()).unwrap().cross_entropy(&[0, 1]).unwrap()
    });
}

#[test]
fn test_embedding_mean_finite_difference() {
    let ids = Tensor::new(vec![0, 2, 2, 1, 3, 0], [2, 3]).unwrap();
    let proj = Variable::constant(t(&[0.5, -0.5, 1.0, 0.25], [2, 2]));
    check_gradient(t(&[0.1, 0.2, -0.3, 0.4, 0.5, 0.0, 0.7, -0.2], [4, 2]), |table| {
        table.embedding_mean(&ids).unwrap().matmul(&proj).unwrap().cross_entropy(&[1, 0]).unwrap()
    });
}

#[test]
fn test_contrastive_chunk_loss_finite_difference() {
    // One direction of the CLIP loss: normalised embeddings against constant, normalised
    // embeddings of the other modality, scaled by exp(logit_scale).
    let texts = Variable::constant(t(&[0.3, 0.1, -0.2, 0.9, 0.5, 0.5, -0.4, 0.2, 0.1], [3, 3]))
        .l2_normalize_rows(1e-12)
        .unwrap();
    let log_scale = Variable::constant(t(&[1.5], [1, 1]));
    check_gradient(t(&[0.4, -0.2, 0.3, 0.1, 0.8, -0.5], [2, 3]), |images| {
        images
            .l2_normalize_rows(1e-12)
            .unwrap()
            .matmul(&texts.transpose().unwrap())
            .unwrap()
            .scale_by(&log_scale.exp())
            .unwrap()
            .cross_entropy(&[1, 2])
            .unwrap()
    });
}
