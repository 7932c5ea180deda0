//! Ordered parallel map for CPU-bound post-processing.
//!
//! Inputs are cut into contiguous chunks that workers pull from a shared
//! queue. Each worker sends back `(chunk_index, results)`; the caller sorts by
//! chunk index and flattens, so output order always equals input order.

use crossbeam_channel::unbounded;
use std::num::NonZeroUsize;
use tracing::trace;

/// Chunks per worker when no chunk size is given.
const CHUNKS_PER_WORKER: usize = 3;

fn default_chunk_size(len: usize, workers: usize) -> usize {
    (len / (CHUNKS_PER_WORKER * workers)).max(1)
}

/// Applies `f` to every input on `workers` threads and returns the results in
/// input order. Returns `None` for an empty input.
///
/// # Examples
///
/// ```
/// use qcjob::engine::parallel::parallel_map;
/// use std::num::NonZeroUsize;
///
/// let squares = parallel_map((1..=5).collect(), NonZeroUsize::new(2).unwrap(), None, |x: u32| x * x);
/// assert_eq!(squares, Some(vec![1, 4, 9, 16, 25]));
/// ```
pub fn parallel_map<T, R, F>(
    inputs: Vec<T>,
    workers: NonZeroUsize,
    chunk_size: Option<NonZeroUsize>,
    f: F,
) -> Option<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    if inputs.is_empty() {
        return None;
    }
    let workers = workers.get();
    let chunk_size = chunk_size
        .map(NonZeroUsize::get)
        .unwrap_or_else(|| default_chunk_size(inputs.len(), workers));

    let (work_tx, work_rx) = unbounded::<(usize, Vec<T>)>();
    let mut chunk_count = 0;
    let mut items = inputs.into_iter().peekable();
    while items.peek().is_some() {
        let chunk: Vec<T> = items.by_ref().take(chunk_size).collect();
        let _ = work_tx.send((chunk_count, chunk));
        chunk_count += 1;
    }
    drop(work_tx);
    trace!(chunk_count, chunk_size, workers, "Parallel map queued.");

    let (done_tx, done_rx) = unbounded::<(usize, Vec<R>)>();
    std::thread::scope(|s| {
        for _ in 0..workers.min(chunk_count) {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let f = &f;
            s.spawn(move || {
                while let Ok((index, chunk)) = work_rx.recv() {
                    let results = chunk.into_iter().map(f).collect();
                    if done_tx.send((index, results)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(done_tx);

    let mut chunks: Vec<(usize, Vec<R>)> = done_rx.try_iter().collect();
    chunks.sort_unstable_by_key(|(index, _)| *index);
    Some(chunks.into_iter().flat_map(|(_, results)| results).collect())
}

/// Like [`parallel_map`] for functions that may produce nothing: yields
/// `None` when every call returned `None`, otherwise the ordered results.
pub fn parallel_map_optional<T, R, F>(
    inputs: Vec<T>,
    workers: NonZeroUsize,
    chunk_size: Option<NonZeroUsize>,
    f: F,
) -> Option<Vec<Option<R>>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> Option<R> + Sync,
{
    let results = parallel_map(inputs, workers, chunk_size, f)?;
    if results.iter().all(Option::is_none) {
        None
    } else {
        Some(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn n(v: usize) -> NonZeroUsize {
        NonZeroUsize::new(v).unwrap()
    }

    #[test]
    fn output_order_matches_input_for_any_worker_count() {
        let inputs: Vec<u64> = (0..97).collect();
        let expected: Vec<u64> = inputs.iter().map(|x| x * 3 + 1).collect();
        for workers in 1..=8 {
            for chunk in [None, Some(n(1)), Some(n(7)), Some(n(200))] {
                let out = parallel_map(inputs.clone(), n(workers), chunk, |x| x * 3 + 1);
                assert_eq!(out.as_ref(), Some(&expected), "workers={} chunk={:?}", workers, chunk);
            }
        }
    }

    #[test]
    fn order_survives_uneven_completion_times() {
        // Early items sleep longest so later chunks finish first.
        let inputs: Vec<u64> = (0..12).collect();
        let out = parallel_map(inputs, n(4), Some(n(1)), |x| {
            std::thread::sleep(Duration::from_millis((12 - x) * 3));
            x
        });
        assert_eq!(out, Some((0..12).collect()));
    }

    #[test]
    fn tuple_arguments_are_supported() {
        let pairs = vec![(1, "a"), (2, "bb"), (3, "ccc")];
        let out = parallel_map(pairs, n(2), None, |(k, s): (usize, &str)| k * s.len());
        assert_eq!(out, Some(vec![1, 4, 9]));
    }

    #[test]
    fn empty_input_yields_none() {
        assert_eq!(parallel_map(Vec::<u8>::new(), n(4), None, |x| x), None);
    }

    #[test]
    fn optional_map_is_none_only_when_every_call_is_none() {
        let none = parallel_map_optional(vec![1, 2, 3], n(2), None, |_: i32| None::<i32>);
        assert_eq!(none, None);

        let some = parallel_map_optional(vec![1, 2, 3], n(2), None, |x: i32| (x != 2).then_some(x));
        assert_eq!(some, Some(vec![Some(1), None, Some(3)]));
    }

    #[test]
    fn default_chunk_size_targets_three_chunks_per_worker() {
        assert_eq!(default_chunk_size(60, 4), 5);
        assert_eq!(default_chunk_size(5, 4), 1);
    }
}
