//! Selection of the code path for one algorithm call.
//!
//! The path is chosen once per call from the policy's scheduling and the target's
//! layout and traversal:
//!
//! | layout    | scheduling                         | path                                  |
//! |-----------|------------------------------------|---------------------------------------|
//! | plain     | sequential                         | [`Algorithm::sequential`]             |
//! | plain     | other, traversal below `Forward`   | [`Algorithm::sequential`], one chunk  |
//! | plain     | parallel or distributed            | [`Algorithm::parallel`]               |
//! | segmented | sequential or parallel             | plain path per segment, in order      |
//! | segmented | distributed                        | one executor task per segment         |
//!
//! Whatever the path, its outcome goes through [`ResultShape::compose`] exactly once.

use parex_common::{Error, Result};

use crate::{
    exception_list::{ExceptionList, merge_results},
    execution::Executor,
    future::ResultShape,
    policy::{Policy, Scheduling},
    segmented::SegmentDescriptor,
    target::{Layout, SeqRange, Target, Traversal},
};

/// The per-algorithm part of a call: a sequential and a chunked-parallel implementation
/// over a plain target, plus the recombination of per-segment results.
pub trait Algorithm: Clone + Send + Sync + 'static {
    type Item: Send + 'static;
    type Output: Send + 'static;

    /// Short name used in failure messages and logs.
    fn name(&self) -> &'static str;

    /// Processes the first `count` elements of `target` in order on the calling thread.
    fn sequential<R>(&self, target: &R, count: usize) -> Result<Self::Output>
    where
        R: Target<Item = Self::Item>;

    /// Processes the first `count` elements of `target` in chunks submitted to
    /// `executor`.
    fn parallel<E, R>(
        &self,
        executor: &E,
        chunk_size: Option<usize>,
        target: &R,
        count: usize,
    ) -> Result<Self::Output>
    where
        E: Executor,
        R: Target<Item = Self::Item>;

    /// Combines the results of the segments of a segmented target, given in segment
    /// order. `begin` is the target's starting position.
    fn merge_segments(
        &self,
        begin: usize,
        partials: Vec<(SegmentDescriptor<Self::Item>, Self::Output)>,
    ) -> Self::Output;
}

/// Runs `algorithm` over the first `count` elements of `target` under `policy`.
pub fn dispatch<S, E, A, R>(
    policy: &Policy<S, E>,
    algorithm: A,
    target: R,
    count: usize,
) -> S::Output<A::Output>
where
    S: ResultShape,
    E: Executor,
    A: Algorithm,
    R: Target<Item = A::Item>,
{
    let executor = policy.executor().clone();
    let scheduling = policy.scheduling();
    let chunk_size = policy.chunk_size();
    log::debug!(
        "{}: {} over {count} element(s) on {}",
        algorithm.name(),
        policy.kind(),
        executor.name()
    );
    S::compose(policy.executor(), algorithm.name(), move || {
        match target.layout(count)? {
            Layout::Plain => {
                run_plain(scheduling, &executor, chunk_size, &algorithm, &target, count)
            }
            Layout::Segmented(segments) => run_segmented(
                scheduling,
                &executor,
                chunk_size,
                &algorithm,
                target.begin(),
                segments,
            ),
        }
    })
}

fn run_plain<E, A, R>(
    scheduling: Scheduling,
    executor: &E,
    chunk_size: Option<usize>,
    algorithm: &A,
    target: &R,
    count: usize,
) -> Result<A::Output>
where
    E: Executor,
    A: Algorithm,
    R: Target<Item = A::Item>,
{
    if scheduling == Scheduling::Sequential {
        return algorithm.sequential(target, count);
    }
    if target.traversal() < Traversal::Forward {
        log::trace!(
            "{}: sequential path, traversal {:?}",
            algorithm.name(),
            target.traversal()
        );
        // The whole target is a single chunk: a failure is reported as an aggregate
        // with one entry.
        let failures = ExceptionList::new();
        let output = failures.capture(0..count, || algorithm.sequential(target, count));
        failures.into_result(algorithm.name())?;
        return output.unwrap_or_else(|| Err(Error::broken_promise()));
    }
    algorithm.parallel(executor, chunk_size, target, count)
}

fn run_segmented<E, A>(
    scheduling: Scheduling,
    executor: &E,
    chunk_size: Option<usize>,
    algorithm: &A,
    begin: usize,
    segments: Vec<SegmentDescriptor<A::Item>>,
) -> Result<A::Output>
where
    E: Executor,
    A: Algorithm,
{
    log::debug!("{}: {} segment(s)", algorithm.name(), segments.len());
    let results = match scheduling {
        Scheduling::Sequential | Scheduling::Parallel => segments
            .into_iter()
            .map(|segment| run_segment(scheduling, executor, chunk_size, algorithm, segment))
            .collect::<Vec<_>>(),
        Scheduling::Distributed => {
            let task_executor = executor.clone();
            let task_algorithm = algorithm.clone();
            let handles = executor.bulk_async_execute(segments, move |segment| {
                run_segment(
                    scheduling,
                    &task_executor,
                    chunk_size,
                    &task_algorithm,
                    segment,
                )
            });
            handles
                .into_iter()
                .map(|handle| handle.try_join().unwrap_or_else(|| Err(Error::broken_promise())))
                .collect()
        }
    };
    let partials = merge_results(algorithm.name(), results)?;
    Ok(algorithm.merge_segments(begin, partials))
}

type SegmentResult<A> = (SegmentDescriptor<<A as Algorithm>::Item>, <A as Algorithm>::Output);

fn run_segment<E, A>(
    scheduling: Scheduling,
    executor: &E,
    chunk_size: Option<usize>,
    algorithm: &A,
    segment: SegmentDescriptor<A::Item>,
) -> Result<SegmentResult<A>>
where
    E: Executor,
    A: Algorithm,
{
    log::trace!(
        "{}: segment {:?} on {}",
        algorithm.name(),
        segment.global,
        segment.locality
    );
    let local: &SeqRange<A::Item> = &segment.local;
    let output = run_plain(scheduling, executor, chunk_size, algorithm, local, segment.len())?;
    Ok((segment, output))
}
