//! Contiguous, near-equal splitting of work lists

/// Sizes of `parts` contiguous slices covering `len` items.
///
/// The first `len % parts` slices get one extra item, so sizes differ by at
/// most one. Returns an empty list when `parts` is zero.
pub fn partition_sizes(len: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = len / parts;
    let extra = len % parts;
    (0..parts)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Split `items` into `parts` contiguous slices, preserving input order.
///
/// Some slices are empty when there are fewer items than parts.
pub fn partition<T>(items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    let sizes = partition_sizes(items.len(), parts);
    let mut iter = items.into_iter();
    sizes
        .into_iter()
        .map(|size| iter.by_ref().take(size).collect())
        .collect()
}
