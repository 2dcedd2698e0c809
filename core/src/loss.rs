//! Classification losses and metrics over logit matrices.
//!
//! A contrastive logit matrix is an ordinary classification problem in both directions: row `i`
//! should put its mass on column `targets[i]`, and column `j` should put its mass on row
//! `targets[j]`. The tracked (differentiable) cross-entropy lives on
//! [`Variable::cross_entropy`](crate::autograd::Variable::cross_entropy); the functions here work
//! on plain tensors and are used for reporting.

use crate::tensor::{FloatElem, Result, Tensor, TensorError, elem_from_usize};

/// Mean negative log-likelihood of `targets` under row-wise log-probabilities.
///
/// # Errors
///
/// Fails if there are no rows, if `targets` does not have one entry per row, or if a target is
/// not a valid column.
pub fn nll_mean<T: FloatElem>(log_probs: &Tensor<T, 2>, targets: &[usize]) -> Result<T> {
    let [rows, cols] = *log_probs.shape();
    check_targets(rows, cols, targets)?;

    let total = log_probs
        .data()
        .chunks(cols)
        .zip(targets)
        .fold(T::zero(), |acc, (row, &t)| acc - row[t]);
    Ok(total / elem_from_usize(rows)?)
}

/// Mean cross-entropy of row-wise logits against one target class per row.
pub fn cross_entropy<T: FloatElem>(logits: &Tensor<T, 2>, targets: &[usize]) -> Result<T> {
    nll_mean(&logits.log_softmax_rows()?, targets)
}

/// Symmetric contrastive loss: the mean of the row-wise cross-entropy of the image logits and
/// of the text logits against the same targets.
///
/// For a square matrix `text_logits` is usually `image_logits` transposed.
pub fn contrastive_loss<T: FloatElem>(
    image_logits: &Tensor<T, 2>,
    text_logits: &Tensor<T, 2>,
    targets: &[usize],
) -> Result<T> {
    let two = T::one() + T::one();
    Ok((cross_entropy(image_logits, targets)? + cross_entropy(text_logits, targets)?) / two)
}

/// Fraction of columns whose largest entry sits in the row named by `targets`.
///
/// Taking the argmax over axis 0 asks, for every text, which image scores highest.
pub fn accuracy<T: FloatElem>(logits: &Tensor<T, 2>, targets: &[usize]) -> Result<T> {
    let [rows, cols] = *logits.shape();
    if targets.len() != cols {
        return Err(TensorError::ShapeMismatch {
            expected: vec![cols],
            got: vec![targets.len()],
        });
    }
    if cols == 0 || rows == 0 {
        return Err(TensorError::Unsupported("accuracy of an empty logit matrix".into()));
    }
    let hits = logits
        .argmax_axis0()
        .iter()
        .zip(targets)
        .filter(|(pred, target)| pred == target)
        .count();
    Ok(elem_from_usize::<T>(hits)? / elem_from_usize(cols)?)
}

fn check_targets(rows: usize, cols: usize, targets: &[usize]) -> Result<()> {
    if rows == 0 {
        return Err(TensorError::Unsupported("cross entropy over zero rows".into()));
    }
    if targets.len() != rows {
        return Err(TensorError::ShapeMismatch {
            expected: vec![rows],
            got: vec![targets.len()],
        });
    }
    if let Some(&bad) = targets.iter().find(|&&t| t >= cols) {
        return Err(TensorError::IndexOutOfBounds {
            index: vec![bad],
            shape: vec![rows, cols],
        });
    }
    Ok(())
}
