//! Execution policies.
//!
//! A [`Policy`] combines a [`Scheduling`] mode, a result shape ([`Eager`] or [`Task`]),
//! an optional chunk-size hint and the executor the work is submitted to. Policies are
//! plain values: every modifier returns a new policy.
//!
//! ```rust,no_run
//! use parex_parallel::policy;
//!
//! let p = policy::par().with_chunk_size(64);
//! assert!(!p.is_sequential());
//! let deferred = p.with_deferred();
//! assert!(deferred.is_deferred());
//! assert_eq!(deferred.kind().to_string(), "par(task)");
//! ```

use std::{fmt, marker::PhantomData};

use crate::{
    execution::{EagerExecutor, Executor},
    future::{Eager, ResultShape, Task},
};

/// How the work of one call is spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheduling {
    /// In order, on one thread.
    Sequential,
    /// In chunks submitted to the executor.
    Parallel,
    /// Per segment, one executor task each; chunked within a segment. Plain targets are
    /// treated as under `Parallel`.
    Distributed,
}

/// The combinations of scheduling and result shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Sequential,
    SequentialDeferred,
    Parallel,
    ParallelDeferred,
    Distributed,
    DistributedDeferred,
}

impl PolicyKind {
    pub fn new(scheduling: Scheduling, deferred: bool) -> PolicyKind {
        match (scheduling, deferred) {
            (Scheduling::Sequential, false) => PolicyKind::Sequential,
            (Scheduling::Sequential, true) => PolicyKind::SequentialDeferred,
            (Scheduling::Parallel, false) => PolicyKind::Parallel,
            (Scheduling::Parallel, true) => PolicyKind::ParallelDeferred,
            (Scheduling::Distributed, false) => PolicyKind::Distributed,
            (Scheduling::Distributed, true) => PolicyKind::DistributedDeferred,
        }
    }

    pub fn scheduling(self) -> Scheduling {
        match self {
            PolicyKind::Sequential | PolicyKind::SequentialDeferred => Scheduling::Sequential,
            PolicyKind::Parallel | PolicyKind::ParallelDeferred => Scheduling::Parallel,
            PolicyKind::Distributed | PolicyKind::DistributedDeferred => Scheduling::Distributed,
        }
    }

    pub fn is_deferred(self) -> bool {
        matches!(
            self,
            PolicyKind::SequentialDeferred
                | PolicyKind::ParallelDeferred
                | PolicyKind::DistributedDeferred
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Sequential => "seq",
            PolicyKind::SequentialDeferred => "seq(task)",
            PolicyKind::Parallel => "par",
            PolicyKind::ParallelDeferred => "par(task)",
            PolicyKind::Distributed => "dist",
            PolicyKind::DistributedDeferred => "dist(task)",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Policy<S = Eager, E = EagerExecutor> {
    scheduling: Scheduling,
    chunk_size: Option<usize>,
    executor: E,
    shape: PhantomData<S>,
}

impl<S: ResultShape, E: Executor> Policy<S, E> {
    pub fn new(scheduling: Scheduling, executor: E) -> Policy<S, E> {
        Policy {
            scheduling,
            chunk_size: None,
            executor,
            shape: PhantomData,
        }
    }

    pub fn scheduling(&self) -> Scheduling {
        self.scheduling
    }

    pub fn is_sequential(&self) -> bool {
        self.scheduling == Scheduling::Sequential
    }

    pub fn is_deferred(&self) -> bool {
        S::DEFERRED
    }

    pub fn kind(&self) -> PolicyKind {
        PolicyKind::new(self.scheduling, S::DEFERRED)
    }

    pub fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The deferred counterpart: `seq` → `seq(task)`, `par` → `par(task)`,
    /// `dist` → `dist(task)`. Deferred policies map to themselves.
    pub fn with_deferred(self) -> Policy<Task, E> {
        self.with_shape()
    }

    /// The blocking counterpart, the inverse of [`with_deferred`](Self::with_deferred).
    pub fn with_eager(self) -> Policy<Eager, E> {
        self.with_shape()
    }

    /// Sets the number of elements per chunk. Values below 1 are treated as 1.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Policy<S, E> {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    pub fn with_scheduling(mut self, scheduling: Scheduling) -> Policy<S, E> {
        self.scheduling = scheduling;
        self
    }

    /// The same policy submitting its work to `executor`.
    pub fn on<E2: Executor>(self, executor: E2) -> Policy<S, E2> {
        Policy {
            scheduling: self.scheduling,
            chunk_size: self.chunk_size,
            executor,
            shape: PhantomData,
        }
    }

    fn with_shape<S2: ResultShape>(self) -> Policy<S2, E> {
        Policy {
            scheduling: self.scheduling,
            chunk_size: self.chunk_size,
            executor: self.executor,
            shape: PhantomData,
        }
    }
}

impl<S, E: Clone> Clone for Policy<S, E> {
    fn clone(&self) -> Self {
        Policy {
            scheduling: self.scheduling,
            chunk_size: self.chunk_size,
            executor: self.executor.clone(),
            shape: PhantomData,
        }
    }
}

impl<S: ResultShape, E: Executor> fmt::Debug for Policy<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("kind", &self.kind())
            .field("chunk_size", &self.chunk_size)
            .field("executor", &self.executor.name())
            .finish()
    }
}

pub fn seq() -> Policy<Eager> {
    Policy::new(Scheduling::Sequential, EagerExecutor::global())
}

pub fn seq_task() -> Policy<Task> {
    seq().with_deferred()
}

pub fn par() -> Policy<Eager> {
    Policy::new(Scheduling::Parallel, EagerExecutor::global())
}

pub fn par_task() -> Policy<Task> {
    par().with_deferred()
}

pub fn dist() -> Policy<Eager> {
    Policy::new(Scheduling::Distributed, EagerExecutor::global())
}

pub fn dist_task() -> Policy<Task> {
    dist().with_deferred()
}

#[cfg(test)]
mod tests {
    use super::{PolicyKind, Scheduling, dist, par, seq};
    use crate::execution::{Executor, InlineExecutor};

    #[test]
    fn test_with_deferred_is_total() {
        assert_eq!(seq().with_deferred().kind(), PolicyKind::SequentialDeferred);
        assert_eq!(par().with_deferred().kind(), PolicyKind::ParallelDeferred);
        assert_eq!(dist().with_deferred().kind(), PolicyKind::DistributedDeferred);
        assert_eq!(
            par().with_deferred().with_deferred().kind(),
            PolicyKind::ParallelDeferred
        );
        assert_eq!(par().with_deferred().with_eager().kind(), PolicyKind::Parallel);
    }

    #[test]
    fn test_predicates() {
        assert!(seq().is_sequential());
        assert!(!seq().is_deferred());
        assert!(seq().with_deferred().is_sequential());
        assert!(!par().is_sequential());
        assert!(par().with_deferred().is_deferred());
        assert!(!dist().is_sequential());
        assert_eq!(dist().scheduling(), Scheduling::Distributed);
    }

    #[test]
    fn test_modifiers_keep_other_settings() {
        let p = par().with_chunk_size(0).with_deferred().on(InlineExecutor);
        assert_eq!(p.chunk_size(), Some(1));
        assert_eq!(p.kind(), PolicyKind::ParallelDeferred);
        assert_eq!(p.executor().name(), "inline");
        assert_eq!(
            p.with_scheduling(Scheduling::Sequential).kind(),
            PolicyKind::SequentialDeferred
        );
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            PolicyKind::Sequential,
            PolicyKind::SequentialDeferred,
            PolicyKind::Parallel,
            PolicyKind::ParallelDeferred,
            PolicyKind::Distributed,
            PolicyKind::DistributedDeferred,
        ] {
            assert_eq!(PolicyKind::new(kind.scheduling(), kind.is_deferred()), kind);
        }
        assert_eq!(PolicyKind::DistributedDeferred.to_string(), "dist(task)");
    }
}
