//! Splitting of an output range into chunks and their bulk submission.

use std::ops::Range;

use parex_common::Result;

use crate::{exception_list::ExceptionList, execution::Executor};

/// Number of chunks per unit of executor parallelism when no chunk size is given.
const CHUNKS_PER_WORKER: usize = 4;

/// A contiguous, exclusively borrowed part of the output range.
#[derive(Debug)]
pub struct Chunk<'a, T> {
    /// Position of the first element, relative to the start of the partitioned slice.
    pub offset: usize,
    pub slice: &'a mut [T],
}

impl<T> Chunk<'_, T> {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.slice.len()
    }
}

/// Chunk size for `count` elements: the `hint` when given, otherwise enough to make
/// about four chunks per unit of `parallelism`. Never 0.
pub fn chunk_size(hint: Option<usize>, count: usize, parallelism: usize) -> usize {
    hint.unwrap_or_else(|| count.div_ceil(parallelism.max(1) * CHUNKS_PER_WORKER))
        .max(1)
}

/// Splits `slice` into chunks of `chunk_size` elements (the last one may be shorter).
/// The chunks are disjoint and cover the slice in order.
///
/// # Panics
///
/// Panics if `chunk_size` is 0.
pub fn partition<T>(slice: &mut [T], chunk_size: usize) -> Vec<Chunk<'_, T>> {
    assert_ne!(chunk_size, 0, "chunk_size must be greater than 0");
    slice
        .chunks_mut(chunk_size)
        .enumerate()
        .map(|(i, slice)| Chunk {
            offset: i * chunk_size,
            slice,
        })
        .collect()
}

/// Applies `f` to every chunk of `slice` through the executor's bulk operation and
/// waits for all of them.
///
/// A chunk that panics does not affect its siblings. Once every chunk has settled the
/// captured failures are returned as one aggregate error named after `algorithm`.
pub fn for_each_chunk<E, T, F>(
    executor: &E,
    algorithm: &str,
    slice: &mut [T],
    chunk_size: usize,
    f: F,
) -> Result<()>
where
    E: Executor,
    T: Send,
    F: Fn(Chunk<'_, T>) + Sync,
{
    let chunks = partition(slice, chunk_size);
    log::debug!(
        "{algorithm}: {} chunk(s) of up to {chunk_size} element(s) on {}",
        chunks.len(),
        executor.name()
    );
    let failures = ExceptionList::new();
    executor.bulk_sync_execute(chunks, |chunk| {
        let range = chunk.range();
        log::trace!("{algorithm}: chunk {range:?}");
        failures.capture(range, || f(chunk));
    });
    failures.into_result(algorithm)
}
