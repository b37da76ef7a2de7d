use std::sync::Arc;

use parex_workflow::{eager_pool::EagerPool, join_handle::JoinHandle};

use super::{Capabilities, Executor};

/// Executor backed by an [`EagerPool`].
///
/// All four capabilities are native. One-way and bulk work submitted while every worker
/// is busy runs on the submitting thread, so units that submit more work and wait for it
/// cannot starve the pool. `async_execute` never runs on the submitting thread: it gets a
/// dedicated thread when the pool is saturated.
#[derive(Clone)]
pub struct EagerExecutor {
    pool: EagerPool,
    max_degree: Option<usize>,
}

impl EagerExecutor {
    pub fn new(pool: EagerPool) -> EagerExecutor {
        EagerExecutor {
            pool,
            max_degree: None,
        }
    }

    /// Executor over the process-wide pool, see [`EagerPool::global`].
    pub fn global() -> EagerExecutor {
        Self::new(EagerPool::global().clone())
    }

    /// Caps the number of concurrently running units of one bulk submission, the
    /// submitting thread included. Values below 1 are treated as 1.
    pub fn with_max_degree(mut self, max_degree: usize) -> EagerExecutor {
        self.max_degree = Some(max_degree.max(1));
        self
    }

    pub fn pool(&self) -> &EagerPool {
        &self.pool
    }
}

impl Executor for EagerExecutor {
    const NATIVE: Capabilities = Capabilities::all();

    fn name(&self) -> &'static str {
        "eager"
    }

    fn parallelism(&self) -> usize {
        let available = self.pool.num_threads() + 1;
        self.max_degree.map_or(available, |max| max.min(available))
    }

    fn sync_execute<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        f()
    }

    fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.pool.spawn(f);
    }

    fn async_execute<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.pool.launch(f)
    }

    fn bulk_sync_execute<S, F>(&self, shape: Vec<S>, f: F)
    where
        S: Send,
        F: Fn(S) + Sync,
    {
        let f = &f;
        self.pool.restricted_scope(self.parallelism(), |scope| {
            for item in shape {
                scope.spawn(move || f(item));
            }
        });
    }

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
                self.pool.spawn(move || f(item))
            })
            .collect()
    }
}
