use std::{num::NonZeroUsize, slice::Chunks};

/// Splits `items` into contiguous, order-preserving batches of `size`.
///
/// Every batch holds exactly `size` items except possibly the last one, which holds the
/// remainder. An evenly divisible input yields no trailing partial batch and an empty input
/// yields no batches at all.
pub fn batches<T>(items: &[T], size: NonZeroUsize) -> Chunks<'_, T> {
    items.chunks(size.get())
}

/// Length of the trailing partial batch, `0` when `len` divides evenly.
pub fn remainder_batch_len(len: usize, size: NonZeroUsize) -> usize {
    len % size.get()
}
