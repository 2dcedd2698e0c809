//! Row-wise kernels over `[rows, cols]` matrices.
//!
//! Both kernels are the numerically sensitive building blocks of a contrastive loss:
//! `log_softmax` subtracts the row maximum before exponentiating, and the L2 normalisation
//! clamps the norm from below like `F.normalize` does.

use crate::{KernelFloat, Result};
use rayon::prelude::*;

/// Row-wise `log_softmax` of a `[rows, cols]` matrix.
pub fn cpu_log_softmax_rows<T>(data: &[T], shape: &[usize; 2]) -> Result<Vec<T>>
where
    T: KernelFloat,
{
    crate::check_len(data.len(), shape)?;
    let cols = shape[1];
    let mut out = vec![T::zero(); data.len()];
    if cols == 0 {
        return Ok(out);
    }

    out.par_chunks_mut(cols)
        .zip(data.par_chunks(cols))
        .for_each(|(out_row, row)| {
            let max = row.iter().copied().fold(T::neg_infinity(), T::max);
            let sum = row.iter().fold(T::zero(), |acc, &x| acc + (x - max).exp());
            let log_sum = max + sum.ln();
            for (o, &x) in out_row.iter_mut().zip(row.iter()) {
                *o = x - log_sum;
            }
        });

    Ok(out)
}

/// Divides every row of a `[rows, cols]` matrix by `max(||row||, eps)`.
///
/// Returns the normalised data and the clamped norm of each row.
pub fn cpu_l2_normalize_rows<T>(data: &[T], shape: &[usize; 2], eps: T) -> Result<(Vec<T>, Vec<T>)>
where
    T: KernelFloat,
{
    crate::check_len(data.len(), shape)?;
    let [rows, cols] = *shape;
    let mut out = vec![T::zero(); data.len()];
    let mut norms = vec![T::zero(); rows];
    if cols == 0 {
        return Ok((out, norms));
    }

    out.par_chunks_mut(cols)
        .zip(data.par_chunks(cols))
        .zip(norms.par_iter_mut())
        .for_each(|((out_row, row), norm)| {
            let sq = row.iter().fold(T::zero(), |acc, &x| acc + x * x);
            *norm = sq.sqrt().max(eps);
            for (o, &x) in out_row.iter_mut().zip(row.iter()) {
                *o = x / *norm;
            }
        });

    Ok((out, norms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_softmax_uniform_row() {
        let data = vec![0.0f64; 4];
        let out = cpu_log_softmax_rows(&data, &[1, 4]).unwrap();
        for v in out {
            assert!((v - (0.25f64).ln()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_log_softmax_is_shift_invariant() {
        let a = vec![1.0f64, 2.0, 3.0];
        let b = vec![1001.0f64, 1002.0, 1003.0];
        let la = cpu_log_softmax_rows(&a, &[1, 3]).unwrap();
        let lb = cpu_log_softmax_rows(&b, &[1, 3]).unwrap();
        for (x, y) in la.iter().zip(lb.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_l2_normalize_rows() {
        let data = vec![3.0f32, 4.0, 0.0, 2.0];
        let (out, norms) = cpu_l2_normalize_rows(&data, &[2, 2], 1e-12).unwrap();
        assert_eq!(norms, vec![5.0, 2.0]);
        assert!((out[0] - 0.6).abs() < 1e-6);
        assert!((out[1] - 0.8).abs() < 1e-6);
        assert_eq!(&out[2..], &[0.0, 1.0]);
    }

    #[test]
    fn test_l2_normalize_zero_row_uses_eps() {
        let data = vec![0.0f32, 0.0];
        let (out, norms) = cpu_l2_normalize_rows(&data, &[1, 2], 1e-6).unwrap();
        assert_eq!(norms, vec![1e-6]);
        assert_eq!(out, vec![0.0, 0.0]);
    }
}
