//! Executor capability traits.
//!
//! An executor runs work items. Backends differ in what they can do natively:
//!
//! | capability     | operation                  | result                    |
//! |----------------|----------------------------|---------------------------|
//! | `ONE_WAY`      | [`Executor::post`]               | none observed             |
//! | `TWO_WAY`      | [`Executor::async_execute`]      | one [`JoinHandle`]        |
//! | `BULK_ONE_WAY` | [`Executor::bulk_sync_execute`]  | blocks until all complete |
//! | `BULK_TWO_WAY` | [`Executor::bulk_async_execute`] | one handle per item       |
//!
//! Only [`Executor::sync_execute`] is required. Everything a backend does not declare in
//! [`Executor::NATIVE`] is synthesized by the provided methods from a weaker operation:
//! a two-way request runs synchronously and returns an already resolved handle, and
//! the bulk operations loop over single-shot submissions.

use std::sync::Arc;

use bitflags::bitflags;
use parex_workflow::join_handle::JoinHandle;

mod eager;
mod inline;

pub use eager::EagerExecutor;
pub use inline::InlineExecutor;

bitflags! {
    /// Operations an executor provides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const ONE_WAY = 1;
        const TWO_WAY = 2;
        const BULK_ONE_WAY = 4;
        const BULK_TWO_WAY = 8;
    }
}

pub trait Executor: Clone + Send + Sync + 'static {
    /// Capabilities implemented by the backend itself rather than synthesized.
    const NATIVE: Capabilities;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Number of work items the executor can make progress on at once, counting the
    /// submitting thread.
    fn parallelism(&self) -> usize {
        1
    }

    /// Runs `f` and blocks until it returns.
    fn sync_execute<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send;

    /// Runs `f` without observing its outcome.
    fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.sync_execute(f)
    }

    /// Starts `f` and returns a handle to its result.
    fn async_execute<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        JoinHandle::ready(self.sync_execute(f))
    }

    /// Runs `f` once per element of `shape` and blocks until every invocation returned.
    ///
    /// Invocations may run concurrently and in any order.
    fn bulk_sync_execute<S, F>(&self, shape: Vec<S>, f: F)
    where
        S: Send,
        F: Fn(S) + Sync,
    {
        let f = &f;
        for item in shape {
            self.sync_execute(move || f(item));
        }
    }

    /// Starts one invocation of `f` per element of `shape`. The handles are returned in
    /// shape order.
    fn bulk_async_execute<S, F, R>(&self, shape: Vec<S>, f: F) -> Vec<JoinHandle<R>>
    where
        S: Send + 'static,
        F: Fn(S) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        shape
            .into_iter()
            .map(|item| {
                let f = f.clone();
                self.async_execute(move || f(item))
            })
            .collect()
    }

    fn capabilities(&self) -> Capabilities {
        Self::NATIVE
    }

    /// Capabilities served by the provided fallbacks.
    fn synthesized(&self) -> Capabilities {
        Capabilities::all().difference(Self::NATIVE)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::{Capabilities, Executor};

    /// Provides nothing but `sync_execute`.
    #[derive(Clone, Default)]
    struct CountingExecutor(Arc<AtomicUsize>);

    impl Executor for CountingExecutor {
        const NATIVE: Capabilities = Capabilities::empty();

        fn name(&self) -> &'static str {
            "counting"
        }

        fn sync_execute<F, R>(&self, f: F) -> R
        where
            F: FnOnce() -> R + Send,
            R: Send,
        {
            self.0.fetch_add(1, Ordering::SeqCst);
            f()
        }
    }

    #[test]
    fn test_synthesized_operations_go_through_sync_execute() {
        let executor = CountingExecutor::default();
        assert_eq!(executor.synthesized(), Capabilities::all());

        let handle = executor.async_execute(|| 5);
        assert!(handle.is_ready());
        assert_eq!(handle.join(), 5);

        let seen = Mutex::new(Vec::new());
        executor.bulk_sync_execute(vec![1, 2, 3], |i| seen.lock().unwrap().push(i));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);

        let handles = executor.bulk_async_execute(vec![10, 20], |i| i + 1);
        assert!(handles.iter().all(|h| h.is_ready()));
        assert_eq!(
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>(),
            vec![11, 21]
        );

        executor.post(|| ());
        assert_eq!(executor.0.load(Ordering::SeqCst), 1 + 3 + 2 + 1);
    }
}
