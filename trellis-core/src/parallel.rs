//! In-memory map-reduce over a slice of items.
//!
//! The pattern for accumulating sufficient statistics from a dataset: each
//! worker folds a contiguous chunk of the input into its own accumulator and
//! the accumulators are merged in chunk order at the end. With the `parallel`
//! feature disabled the same contract runs as a sequential loop.
//!
//! Merge order is deterministic (chunk order), so results differ between
//! worker counts only up to floating-point associativity.

/// Fold `items` into an accumulator using per-worker partial accumulators.
///
/// - `new_acc` produces the identity accumulator,
/// - `update` folds one item into an accumulator,
/// - `merge` combines a partial accumulator into the running total.
#[cfg(feature = "parallel")]
pub fn map_reduce<T, D, N, U, M>(items: &[T], new_acc: N, update: U, merge: M) -> D
where
    T: Sync,
    D: Send,
    N: Fn() -> D + Sync,
    U: Fn(&mut D, &T) + Sync,
    M: Fn(&mut D, D),
{
    use rayon::prelude::*;

    if items.is_empty() {
        return new_acc();
    }
    let chunk_size = items.len().div_ceil(rayon::current_num_threads()).max(1);
    let partials: Vec<D> = items
        .par_chunks(chunk_size)
        .map(|chunk| {
            let mut acc = new_acc();
            for item in chunk {
                update(&mut acc, item);
            }
            acc
        })
        .collect();

    let mut total = new_acc();
    for partial in partials {
        merge(&mut total, partial);
    }
    total
}

/// Sequential fallback with the identical contract.
#[cfg(not(feature = "parallel"))]
pub fn map_reduce<T, D, N, U, M>(items: &[T], new_acc: N, update: U, merge: M) -> D
where
    N: Fn() -> D,
    U: Fn(&mut D, &T),
    M: Fn(&mut D, D),
{
    let mut acc = new_acc();
    for item in items {
        update(&mut acc, item);
    }
    // Single worker: merge its accumulator into the identity for parity
    // with the parallel path.
    let mut total = new_acc();
    merge(&mut total, acc);
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_all_items() {
        let items: Vec<u64> = (1..=100).collect();
        let total = map_reduce(
            &items,
            || 0u64,
            |acc, &x| *acc += x,
            |acc, partial| *acc += partial,
        );
        assert_eq!(total, 5050);
    }

    #[test]
    fn empty_input_yields_identity() {
        let items: Vec<u64> = Vec::new();
        let total = map_reduce(
            &items,
            || 42u64,
            |acc, &x| *acc += x,
            |acc, partial| *acc = (*acc).min(partial),
        );
        assert_eq!(total, 42);
    }

    #[test]
    fn vector_accumulators_merge_elementwise() {
        let items: Vec<usize> = vec![0, 1, 2, 0, 1, 0];
        let counts = map_reduce(
            &items,
            || vec![0u32; 3],
            |acc, &x| acc[x] += 1,
            |acc, partial| {
                for (a, p) in acc.iter_mut().zip(partial) {
                    *a += p;
                }
            },
        );
        assert_eq!(counts, vec![3, 2, 1]);
    }
}
