use super::{Capabilities, Executor};

/// Runs everything on the submitting thread.
///
/// Only the one-way operations are native. A two-way request is served by running the
/// work synchronously and handing back an already resolved handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    const NATIVE: Capabilities = Capabilities::ONE_WAY.union(Capabilities::BULK_ONE_WAY);

    fn name(&self) -> &'static str {
        "inline"
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
        f()
    }

    fn bulk_sync_execute<S, F>(&self, shape: Vec<S>, f: F)
    where
        S: Send,
        F: Fn(S) + Sync,
    {
        shape.into_iter().for_each(f);
    }
}
