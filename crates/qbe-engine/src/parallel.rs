//! Chunked map/reduce over a list, delivered as a [`Future`].
//!
//! Chunks are mapped on the worker pool of the calculation's [`QoS`] class and folded in
//! their original order. Each chunk checks the job first, so cancelling stops the work
//! between chunks. When no pool could be built the chunks are mapped on the current
//! worker one after another.

use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::future::{Batch, Future};
use crate::job::Job;
use crate::queue;

/// Rows per chunk.
pub const CHUNK_SIZE: usize = 256;

/// Map each chunk of `items`, then fold the chunk results into `init` in order. `None`
/// means the job was cancelled before every chunk was mapped.
pub fn map_reduce<E, T, A, M, R>(
    job: &Job,
    items: &[E],
    chunk_size: usize,
    map: M,
    init: A,
    reduce: R,
) -> Option<A>
where
    E: Sync,
    T: Send,
    M: Fn(&[E]) -> T + Sync,
    R: Fn(A, T) -> A,
{
    let chunk_size = chunk_size.max(1);
    let total = items.len().div_ceil(chunk_size);
    let done = AtomicUsize::new(0);

    let map_chunk = |chunk: &[E]| {
        if job.is_cancelled() {
            return None;
        }
        let out = map(chunk);
        let finished = done.fetch_add(1, Ordering::AcqRel) + 1;
        job.report_progress(finished as f64 / total as f64, job.id());
        Some(out)
    };

    let mapped: Vec<Option<T>> = match queue::pool(job.qos()) {
        Some(pool) => pool.install(|| items.par_chunks(chunk_size).map(map_chunk).collect()),
        None => items.chunks(chunk_size).map(map_chunk).collect(),
    };

    if job.is_cancelled() || mapped.iter().any(Option::is_none) {
        tracing::debug!(job = job.id(), chunks = total, "map/reduce cancelled");
        return None;
    }
    // Chunks finish out of order, so the last per-chunk report may be stale.
    job.report_progress(1.0, job.id());
    Some(mapped.into_iter().flatten().fold(init, reduce))
}

/// [`map_reduce`] as a future: it starts on the first `get` and runs on the job's queue.
pub fn parallel<E, T, A, M, R>(
    items: Arc<Vec<E>>,
    chunk_size: usize,
    map: M,
    init: A,
    reduce: R,
) -> Future<Option<A>>
where
    E: Send + Sync + 'static,
    T: Send + 'static,
    A: Clone + Send + Sync + 'static,
    M: Fn(&[E]) -> T + Send + Sync + 'static,
    R: Fn(A, T) -> A + Send + Sync + 'static,
{
    let map = Arc::new(map);
    let reduce = Arc::new(reduce);
    Future::new(move |batch: Batch<Option<A>>| {
        let items = items.clone();
        let map = map.clone();
        let reduce = reduce.clone();
        let init = init.clone();
        let worker = batch.clone();
        let scheduled = batch.job().spawn(move || {
            let result = map_reduce(worker.job(), &items, chunk_size, &*map, init, &*reduce);
            worker.satisfy(result);
        });
        if !scheduled {
            batch.satisfy(None);
        }
    })
}
