use crate::{KernelElem, Result};
use rayon::prelude::*;

/// CPU matrix multiplication over the last two dimensions.
///
/// Leading dimensions are batch dimensions and must match. The right-hand side is transposed
/// first so that the inner loop walks both operands sequentially.
pub fn cpu_matmul<T, const RANK: usize>(
    lhs_data: &[T],
    rhs_data: &[T],
    lhs_shape: &[usize; RANK],
    rhs_shape: &[usize; RANK],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    crate::check_len(lhs_data.len(), lhs_shape)?;
    crate::check_len(rhs_data.len(), rhs_shape)?;

    let m = lhs_shape[RANK - 2];
    let k = lhs_shape[RANK - 1];
    let n = rhs_shape[RANK - 1];

    if k != rhs_shape[RANK - 2] {
        return Err(crate::KernelError::ShapeMismatch {
            expected: vec![k],
            got: vec![rhs_shape[RANK - 2]],
        });
    }

    let mut out_shape = *lhs_shape;
    out_shape[RANK - 2] = m;
    out_shape[RANK - 1] = n;
    let size: usize = out_shape.iter().product();
    let mut out_data = vec![T::zero(); size];
    if size == 0 {
        return Ok(out_data);
    }

    // rhs is [..., K, N]; rhs_t is [..., N, K]
    let rhs_t_data = super::cpu_transpose::cpu_transpose(rhs_data, rhs_shape)?;

    out_data
        .as_mut_slice()
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(global_row_idx, out_row)| {
            let batch_idx = global_row_idx / m;
            let row_in_matrix = global_row_idx % m;

            let a_row_start = batch_idx * m * k + row_in_matrix * k;
            let a_slice = &lhs_data[a_row_start..a_row_start + k];
            let b_t_batch_offset = batch_idx * n * k;

            for (col_in_matrix, out_elem) in out_row.iter_mut().enumerate() {
                let b_t_row_start = b_t_batch_offset + col_in_matrix * k;
                let b_t_slice = &rhs_t_data[b_t_row_start..b_t_row_start + k];

                let mut sum = T::zero();
                for (&val_a, &val_b) in a_slice.iter().zip(b_t_slice.iter()) {
                    sum += val_a * val_b;
                }
                *out_elem = sum;
            }
        });

    Ok(out_data)
}
