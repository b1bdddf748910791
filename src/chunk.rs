//! Fixed-size batching.
//!
//! Splits an ordered sequence into windows of `size` items (the last one
//! may be shorter). Used to bound encoder sub-batches, document-store bulk
//! writes, and vector upserts.

use crate::error::{Result, SyncError};

/// Split `items` into lazily produced windows of `size`.
///
/// Yields `ceil(len / size)` windows whose concatenation is `items`.
/// Fails with `InvalidArgument` when `size` is zero.
pub fn chunk<T>(items: &[T], size: usize) -> Result<std::slice::Chunks<'_, T>> {
    if size == 0 {
        return Err(SyncError::invalid("chunk size must be >= 1"));
    }
    Ok(items.chunks(size))
}

/// Number of windows [`chunk`] yields for `len` items.
pub fn chunk_count(len: usize, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    len.div_ceil(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_is_invalid() {
        let items = [1, 2, 3];
        assert!(matches!(
            chunk(&items, 0),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_concatenation_restores_input() {
        let items: Vec<u32> = (0..23).collect();
        for size in 1..30 {
            let windows: Vec<&[u32]> = chunk(&items, size).unwrap().collect();
            let flat: Vec<u32> = windows.iter().flat_map(|w| w.iter().copied()).collect();
            assert_eq!(flat, items, "size {}", size);
            assert_eq!(windows.len(), chunk_count(items.len(), size));
        }
    }

    #[test]
    fn test_only_last_window_is_short() {
        let items: Vec<u32> = (0..10).collect();
        let windows: Vec<&[u32]> = chunk(&items, 4).unwrap().collect();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].len(), 4);
        assert_eq!(windows[1].len(), 4);
        assert_eq!(windows[2], &[8, 9]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let items: [u8; 0] = [];
        assert_eq!(chunk(&items, 5).unwrap().count(), 0);
    }
}
