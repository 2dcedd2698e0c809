//! Mini-chunk partitioning and ground-truth index bookkeeping.
//!
//! After the all-gather, the global embedding matrix holds replica 0's rows, then replica 1's,
//! and so on. Local row `i` of mini-chunk `j` on replica `rank` therefore sits at global row
//! `rank * N + j * M + i`, and that is the column its logits must peak at.

use std::ops::Range;

/// Rows per chunk. `minibatch_size == 0` or a size at least `n` means "one chunk".
pub fn chunk_size(n: usize, minibatch_size: usize) -> usize {
    if minibatch_size == 0 || minibatch_size >= n {
        n
    } else {
        minibatch_size
    }
}

/// Number of mini-chunks a batch of `n` rows is split into: `ceil(n / minibatch_size)`, or 1
/// when chunking is disabled. An empty batch has no chunks.
pub fn chunk_count(n: usize, minibatch_size: usize) -> usize {
    if n == 0 {
        0
    } else {
        n.div_ceil(chunk_size(n, minibatch_size))
    }
}

/// Contiguous row ranges of the mini-chunks, in order. All but the last have
/// `chunk_size(n, minibatch_size)` rows.
pub fn chunk_ranges(n: usize, minibatch_size: usize) -> Vec<Range<usize>> {
    let size = chunk_size(n, minibatch_size);
    (0..chunk_count(n, minibatch_size))
        .map(|j| j * size..((j + 1) * size).min(n))
        .collect()
}

/// Global index of the first row of mini-chunk `chunk_index` on replica `rank`.
///
/// `chunk_size` is the nominal chunk size, not the length of a short last chunk.
pub const fn ground_truth_offset(
    rank: usize,
    local_batch_size: usize,
    chunk_index: usize,
    chunk_size: usize,
) -> usize {
    rank * local_batch_size + chunk_index * chunk_size
}

/// Target columns for `len` consecutive rows starting at global index `offset`.
pub fn ground_truth(offset: usize, len: usize) -> Vec<usize> {
    (offset..offset + len).collect()
}
