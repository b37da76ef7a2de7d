//! Result composition: one seam that turns the work of an algorithm call into either
//! a direct `Result` or a [`Deferred`] handle.
//!
//! The shape is a type parameter of the policy, so an algorithm is written once and
//! its return type follows from the policy it is called with:
//!
//! - [`Eager`]: the work runs on the calling thread, which blocks until it is done.
//! - [`Task`]: the work is handed to the executor's `async_execute` and the call
//!   returns right away. Failures travel inside the handle and surface on
//!   [`Deferred::wait`].

use std::panic::AssertUnwindSafe;

use parex_common::{Error, Failure, Result};
use parex_workflow::join_handle::{JoinHandle, promise};

use crate::execution::Executor;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Eager {}
    impl Sealed for super::Task {}
}

pub trait ResultShape: sealed::Sealed + Send + Sync + 'static {
    type Output<T: Send + 'static>;

    const DEFERRED: bool;

    /// Produces the outcome of `work`. Called exactly once per algorithm invocation.
    fn compose<E, T, F>(executor: &E, algorithm: &'static str, work: F) -> Self::Output<T>
    where
        E: Executor,
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static;

    /// An outcome that is already known, e.g. a rejected argument.
    fn ready<T: Send + 'static>(result: Result<T>) -> Self::Output<T>;
}

/// Blocking result shape: `Output<T> = Result<T>`.
#[derive(Debug, Clone, Copy)]
pub struct Eager;

impl ResultShape for Eager {
    type Output<T: Send + 'static> = Result<T>;

    const DEFERRED: bool = false;

    fn compose<E, T, F>(_executor: &E, _algorithm: &'static str, work: F) -> Result<T>
    where
        E: Executor,
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        work()
    }

    fn ready<T: Send + 'static>(result: Result<T>) -> Result<T> {
        result
    }
}

/// Deferred result shape: `Output<T> = Deferred<T>`.
#[derive(Debug, Clone, Copy)]
pub struct Task;

impl ResultShape for Task {
    type Output<T: Send + 'static> = Deferred<T>;

    const DEFERRED: bool = true;

    fn compose<E, T, F>(executor: &E, algorithm: &'static str, work: F) -> Deferred<T>
    where
        E: Executor,
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let handle = executor.async_execute(move || {
            std::panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
                Err(Error::failed(algorithm, Failure::from_panic(payload, None)))
            })
        });
        Deferred(handle)
    }

    fn ready<T: Send + 'static>(result: Result<T>) -> Deferred<T> {
        Deferred::ready(result)
    }
}

/// Handle to the eventual outcome of a deferred algorithm call.
pub struct Deferred<T>(JoinHandle<Result<T>>);

impl<T: Send + 'static> Deferred<T> {
    pub fn new(handle: JoinHandle<Result<T>>) -> Deferred<T> {
        Deferred(handle)
    }

    pub fn ready(result: Result<T>) -> Deferred<T> {
        Deferred(JoinHandle::ready(result))
    }

    pub fn is_ready(&self) -> bool {
        self.0.is_ready()
    }

    /// Blocks until the outcome is available.
    ///
    /// Fails with `BrokenPromise` if the producing work item vanished without
    /// reporting.
    pub fn wait(self) -> Result<T> {
        self.0
            .try_join()
            .unwrap_or_else(|| Err(Error::broken_promise()))
    }

    /// Attaches a continuation and returns a handle to its outcome.
    ///
    /// `f` runs on the thread that completes this handle, or on the caller if the outcome
    /// is already there. It sees failures as well as values.
    pub fn then<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        let (tx, handle) = promise();
        self.0.on_complete(move |outcome| {
            let outcome = outcome.unwrap_or_else(|| Err(Error::broken_promise()));
            let _ = tx.send(f(outcome));
        });
        Deferred(handle)
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("ready", &self.0.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use parex_common::{Error, ErrorKind};
    use parex_workflow::{eager_pool::EagerPool, join_handle::promise};

    use super::{Deferred, Eager, ResultShape, Task};
    use crate::execution::{EagerExecutor, InlineExecutor};

    #[test]
    fn test_eager_runs_on_caller() {
        let caller = std::thread::current().id();
        let res = Eager::compose(&EagerExecutor::new(EagerPool::new(2)), "t", move || {
            Ok(std::thread::current().id() == caller)
        });
        assert!(res.unwrap());
    }

    #[test]
    fn test_task_does_not_block_caller() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let executor = EagerExecutor::new(EagerPool::new(1));
        let deferred = Task::compose(&executor, "t", move || {
            release_rx.recv().unwrap();
            Ok(3)
        });
        assert!(!deferred.is_ready());
        release_tx.send(()).unwrap();
        assert_eq!(deferred.wait().unwrap(), 3);
    }

    #[test]
    fn test_task_captures_panic_as_single_failure() {
        let deferred: Deferred<u32> = Task::compose(&InlineExecutor, "generate", || {
            panic!("generator exhausted")
        });
        assert!(deferred.is_ready());
        let err = deferred.wait().unwrap_err();
        match err.kind() {
            ErrorKind::Failed { algorithm, failure } => {
                assert_eq!(algorithm, "generate");
                assert_eq!(failure.message(), "generator exhausted");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_then_sees_values_and_failures() {
        let doubled = Deferred::ready(Ok(21)).then(|r| r.map(|v: i32| v * 2));
        assert_eq!(doubled.wait().unwrap(), 42);

        let recovered = Deferred::<i32>::ready(Err(Error::invalid_operation("x")))
            .then(|r| Ok(r.is_err()));
        assert!(recovered.wait().unwrap());

        let (tx, handle) = promise();
        let chained = Deferred::new(handle).then(|r| r.map(|v: i32| v + 1));
        assert!(!chained.is_ready());
        std::thread::spawn(move || tx.send(Ok(1)).unwrap())
            .join()
            .unwrap();
        assert_eq!(chained.wait().unwrap(), 2);
    }

    #[test]
    fn test_abandoned_handle_is_broken_promise() {
        let (tx, handle) = promise::<parex_common::Result<u8>>();
        drop(tx);
        let err = Deferred::new(handle).wait().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::BrokenPromise));
    }
}
