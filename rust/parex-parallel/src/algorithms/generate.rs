//! Filling a range with the values of a generator.

use std::{marker::PhantomData, sync::Arc};

use parex_common::{Error, Result, verify_arg};

use crate::{
    dispatch::{Algorithm, dispatch},
    execution::Executor,
    future::ResultShape,
    partitioner,
    policy::Policy,
    segmented::SegmentDescriptor,
    target::{Target, Traversal},
};

/// Assigns `generator()` to every element of `range`.
///
/// Returns the position one past the end of `range`. The range must support at least
/// `Forward` traversal; anything weaker is rejected before the generator runs.
///
/// A panicking generator propagates unaltered under an eager sequential policy. Under
/// parallel and distributed policies each failing chunk contributes one entry to an
/// aggregate error, reported after all chunks finished.
pub fn generate<S, E, R, G>(policy: &Policy<S, E>, range: R, generator: G) -> S::Output<usize>
where
    S: ResultShape,
    E: Executor,
    R: Target,
    G: Fn() -> R::Item + Send + Sync + 'static,
{
    match bind_generate(&range) {
        Ok(count) => dispatch(
            policy,
            Generate::<R::Item, G>::new("generate", generator),
            range,
            count,
        ),
        Err(e) => S::ready(Err(e)),
    }
}

/// Assigns `generator()` to the first `count` elements starting at `first`.
///
/// Returns `first`'s position advanced by `count`. A `count` of zero or less does
/// nothing and returns `first`'s position. `first` must support at least `Output`
/// traversal; output-only sinks are filled sequentially, in order.
pub fn generate_n<S, E, R, G>(
    policy: &Policy<S, E>,
    first: R,
    count: i64,
    generator: G,
) -> S::Output<usize>
where
    S: ResultShape,
    E: Executor,
    R: Target,
    G: Fn() -> R::Item + Send + Sync + 'static,
{
    match bind_generate_n(&first, count) {
        Ok(0) => S::ready(Ok(first.begin())),
        Ok(count) => dispatch(
            policy,
            Generate::<R::Item, G>::new("generate_n", generator),
            first,
            count,
        ),
        Err(e) => S::ready(Err(e)),
    }
}

fn bind_generate<R: Target>(range: &R) -> Result<usize> {
    verify_arg!(range, range.traversal() >= Traversal::Forward);
    range
        .len()
        .ok_or_else(|| Error::invalid_arg("range", "generate requires a bounded range"))
}

fn bind_generate_n<R: Target>(first: &R, count: i64) -> Result<usize> {
    verify_arg!(first, first.traversal() >= Traversal::Output);
    if count <= 0 {
        return Ok(0);
    }
    let count = usize::try_from(count)
        .map_err(|_| Error::invalid_arg("count", format!("{count} does not fit in usize")))?;
    if let Some(len) = first.len() {
        verify_arg!(count, count <= len);
    }
    Ok(count)
}

struct Generate<T, G> {
    name: &'static str,
    generator: Arc<G>,
    item: PhantomData<fn() -> T>,
}

impl<T, G> Generate<T, G> {
    fn new(name: &'static str, generator: G) -> Generate<T, G> {
        Generate {
            name,
            generator: Arc::new(generator),
            item: PhantomData,
        }
    }
}

impl<T, G> Clone for Generate<T, G> {
    fn clone(&self) -> Self {
        Generate {
            name: self.name,
            generator: self.generator.clone(),
            item: PhantomData,
        }
    }
}

impl<T, G> Algorithm for Generate<T, G>
where
    T: Send + 'static,
    G: Fn() -> T + Send + Sync + 'static,
{
    type Item = T;
    type Output = usize;

    fn name(&self) -> &'static str {
        self.name
    }

    fn sequential<R>(&self, target: &R, count: usize) -> Result<usize>
    where
        R: Target<Item = T>,
    {
        let generator = &*self.generator;
        target.assign_each(count, generator)?;
        Ok(target.begin() + count)
    }

    fn parallel<E, R>(
        &self,
        executor: &E,
        chunk_size: Option<usize>,
        target: &R,
        count: usize,
    ) -> Result<usize>
    where
        E: Executor,
        R: Target<Item = T>,
    {
        let chunk_size = partitioner::chunk_size(chunk_size, count, executor.parallelism());
        let generator = &*self.generator;
        target.with_slice_mut(count, |slice| {
            partitioner::for_each_chunk(executor, self.name, slice, chunk_size, |chunk| {
                chunk.slice.iter_mut().for_each(|slot| *slot = generator());
            })
        })??;
        Ok(target.begin() + count)
    }

    /// The end of the last segment, in global positions.
    fn merge_segments(&self, begin: usize, partials: Vec<(SegmentDescriptor<T>, usize)>) -> usize {
        partials
            .last()
            .map_or(begin, |(segment, end)| segment.to_global(*end))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use parex_common::ErrorKind;

    use super::{generate, generate_n};
    use crate::{
        execution::InlineExecutor,
        policy::{self, Scheduling},
        target::{Sequence, Traversal},
    };

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize + Send + Sync + 'static) {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = calls.clone();
        (calls, move || inner.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[test]
    fn test_sequential_visits_in_order() {
        let seq = Sequence::filled(6, 0usize);
        let (calls, next) = counter();
        let end = generate(&policy::seq(), seq.range(), next).unwrap();
        assert_eq!(end, 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(seq.to_vec(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_rejects_weak_traversal_before_running() {
        let seq = Sequence::filled(4, 0usize);
        let (calls, next) = counter();
        let err = generate(
            &policy::par(),
            seq.range().restrict(Traversal::Output),
            next,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

        let (_, next) = counter();
        let deferred = generate_n(
            &policy::par_task(),
            seq.range().restrict(Traversal::Input),
            2,
            next,
        );
        assert!(deferred.is_ready());
        assert!(deferred.wait().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generate_n_count_checks() {
        let seq = Sequence::filled(3, 0u8);
        let err = generate_n(&policy::seq(), seq.range(), 4, || 1).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
        assert_eq!(generate_n(&policy::seq(), seq.range(), -1, || 1).unwrap(), 0);
        assert_eq!(generate_n(&policy::seq(), seq.range(), 2, || 1).unwrap(), 2);
        assert_eq!(seq.to_vec(), vec![1, 1, 0]);
    }

    #[test]
    fn test_output_only_sink_runs_sequentially() {
        let seq = Sequence::from_vec(Vec::<usize>::new());
        let (_, next) = counter();
        let end = generate_n(
            &policy::par().with_chunk_size(1),
            seq.back_inserter(),
            5,
            next,
        )
        .unwrap();
        assert_eq!(end, 5);
        assert_eq!(seq.to_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_sub_range_end_position() {
        let seq = Sequence::filled(10, 0u8);
        let range = seq.sub_range(3..8).unwrap();
        let p = policy::par().on(InlineExecutor).with_chunk_size(2);
        assert_eq!(generate(&p, range.clone(), || 4).unwrap(), 8);
        assert_eq!(
            generate_n(&p.with_scheduling(Scheduling::Sequential), range, 0, || 9).unwrap(),
            3
        );
        assert_eq!(seq.to_vec(), vec![0, 0, 0, 4, 4, 4, 4, 4, 0, 0]);
    }
}
