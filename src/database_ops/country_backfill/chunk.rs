use anyhow::{bail, Result};

/// Split `items` into contiguous batches of at most `chunk_size`, preserving order.
/// Only the last batch may be short; an empty input yields no batches.
pub fn split_into_chunks<T: Clone>(items: &[T], chunk_size: usize) -> Result<Vec<Vec<T>>> {
    Ok(chunk_slices(items, chunk_size)?
        .into_iter()
        .map(<[T]>::to_vec)
        .collect())
}

/// Borrowing variant of [`split_into_chunks`].
pub fn chunk_slices<T>(items: &[T], chunk_size: usize) -> Result<Vec<&[T]>> {
    if chunk_size == 0 {
        bail!("chunk size must be at least 1");
    }
    Ok(items.chunks(chunk_size).collect())
}
