//! Handles for waiting on the results of work items submitted to a pool.
//!
//! - [`JoinHandle<R>`]: for `'static` work items; can be stored, passed around, and given
//!   a completion callback
//! - [`ScopedJoinHandle<'scope, R>`]: for work items borrowing from an enclosing scope

use crate::oneshot::{self, OneshotReceiver, OneshotSender};

/// Creates a connected sender and join handle.
///
/// Whoever holds the sender completes the handle. Dropping the sender without sending
/// abandons the handle: [`JoinHandle::try_join`] then returns `None`.
pub fn promise<R>() -> (OneshotSender<R>, JoinHandle<R>) {
    let (tx, rx) = oneshot::channel();
    (tx, JoinHandle::new(rx))
}

/// A handle for waiting on the result of a work item with `'static` lifetime.
///
/// ## Lifecycle
///
/// 1. **Created**: when a work item is submitted
/// 2. **Pending**: the work item is running or waiting for a worker
/// 3. **Ready**: the work item has completed and the result is available
/// 4. **Consumed**: the result has been retrieved via [`join()`](Self::join), or handed
///    to a callback registered with [`on_complete()`](Self::on_complete)
pub struct JoinHandle<R>(OneshotReceiver<R>);

impl<R> JoinHandle<R> {
    pub fn new(rx: OneshotReceiver<R>) -> JoinHandle<R> {
        JoinHandle(rx)
    }

    /// Creates a `JoinHandle` that is immediately ready with the given result.
    pub fn ready(res: R) -> Self {
        Self(oneshot::ready(res))
    }

    /// Checks if the result is ready without blocking.
    pub fn is_ready(&self) -> bool {
        !self.0.is_pending()
    }

    /// Waits for the work item to complete and returns its result.
    ///
    /// # Panics
    ///
    /// Panics if the work item was abandoned without producing a result, e.g. because
    /// it panicked on a worker thread. Use [`try_join`](Self::try_join) to observe that
    /// case instead.
    pub fn join(self) -> R {
        self.0.recv().expect("recv")
    }

    /// Waits for the work item to complete. Returns `None` if it was abandoned without
    /// producing a result.
    pub fn try_join(self) -> Option<R> {
        self.0.recv()
    }

    /// Hands the result to `f` once it is available, without blocking.
    ///
    /// `f` runs on the thread completing the work item, or right away on the calling
    /// thread if the result is already there. An abandoned work item is reported as
    /// `None`.
    pub fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Option<R>) + Send + 'static,
    {
        self.0.on_ready(f);
    }

    /// Waits for all handles and collects their results in input order.
    pub fn join_all(handles: impl IntoIterator<Item = JoinHandle<R>>) -> Vec<R> {
        handles.into_iter().map(|h| h.join()).collect()
    }
}

/// A handle for waiting on the result of a scoped work item.
///
/// The `'scope` lifetime ties the handle to the scope that spawned the work item, so it
/// cannot outlive the data the work item borrows.
pub struct ScopedJoinHandle<'scope, R>(OneshotReceiver<R>, std::marker::PhantomData<&'scope ()>);

impl<'scope, R> ScopedJoinHandle<'scope, R> {
    pub(crate) fn new(rx: OneshotReceiver<R>) -> ScopedJoinHandle<'scope, R> {
        ScopedJoinHandle(rx, Default::default())
    }

    pub fn ready(res: R) -> Self {
        Self(oneshot::ready(res), Default::default())
    }

    pub fn is_ready(&self) -> bool {
        !self.0.is_pending()
    }

    pub fn join(self) -> R {
        self.0.recv().expect("recv")
    }
}
