use crate::{KernelElem, Result};
use rayon::prelude::*;

/// CPU transpose of the last two dimensions.
///
/// Parallelised over the rows of the output, which has shape `[Batch..., N, M]`.
pub fn cpu_transpose<T, const RANK: usize>(data: &[T], shape: &[usize; RANK]) -> Result<Vec<T>>
where
    T: KernelElem,
{
    crate::check_len(data.len(), shape)?;

    let m = shape[RANK - 2];
    let n = shape[RANK - 1];

    let mut out_data = vec![T::zero(); data.len()];
    if data.is_empty() {
        return Ok(out_data);
    }

    out_data
        .as_mut_slice()
        .par_chunks_mut(m)
        .enumerate()
        .for_each(|(i, out_row)| {
            let batch_idx = i / n;
            let col_idx = i % n;
            let input_batch_offset = batch_idx * m * n;

            for (r, out_elem) in out_row.iter_mut().enumerate() {
                *out_elem = data[input_batch_offset + r * n + col_idx];
            }
        });

    Ok(out_data)
}
