//! A single-value channel between threads, with optional completion callbacks.
//!
//! The channel carries exactly one value from one (or more, via cloning) senders to a
//! receiver. Besides the blocking receive operations, a receiver can hand
//! the channel a continuation with [`OneshotReceiver::on_ready`]: the continuation runs
//! on whichever thread completes the channel, or immediately when the value is already
//! there.
//!
//! ## Channel Lifecycle
//!
//! 1. Pending: waiting for a value (optionally with a registered continuation)
//! 2. Ready: a value has been sent and is available for consumption
//! 3. Consumed: the value has been taken, handed to a continuation, or the channel
//!    has been closed
//!
//! The channel closes automatically when all senders are dropped without sending.
//! A registered continuation observes that as `None`.

use std::{
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Creates a new oneshot channel, returning a sender and receiver pair.
pub fn channel<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let cell = Arc::new(OneshotCell::new(State::Pending));
    (OneshotSender(cell.clone()), OneshotReceiver(cell))
}

/// Creates a oneshot receiver that is already resolved with the given value.
pub fn ready<T>(result: T) -> OneshotReceiver<T> {
    OneshotReceiver(Arc::new(OneshotCell::new(State::Ready(result))))
}

/// Callback invoked once with the channel's value, or `None` when the channel closed
/// without one.
pub type Continuation<T> = Box<dyn FnOnce(Option<T>) + Send>;

/// The sending half of a oneshot channel.
///
/// Cloning creates another sender for the same channel; only the first successful
/// send is delivered. When every sender is dropped without sending, the channel closes.
pub struct OneshotSender<T>(Arc<OneshotCell<T>>);

impl<T> OneshotSender<T> {
    /// Sends a value, or returns it back if the channel was already completed or closed.
    pub fn send(&self, value: T) -> Result<(), T> {
        self.0.set(value)
    }
}

impl<T> Clone for OneshotSender<T> {
    fn clone(&self) -> OneshotSender<T> {
        self.0.add_sender();
        OneshotSender(self.0.clone())
    }
}

impl<T> Drop for OneshotSender<T> {
    fn drop(&mut self) {
        self.0.drop_sender();
    }
}

/// The receiving half of a oneshot channel.
///
/// The receiver can be cloned, but the value is consumed by a single receive operation.
#[derive(Clone)]
pub struct OneshotReceiver<T>(Arc<OneshotCell<T>>);

impl<T> OneshotReceiver<T> {
    /// Blocks until a value is received or the channel is closed.
    ///
    /// Returns `None` if the value was already consumed or the channel was closed
    /// before a value was sent.
    pub fn recv(&self) -> Option<T> {
        self.0.wait()
    }

    /// Like [`recv`](Self::recv), but gives up with `RecvTimeoutError::Timeout` once
    /// `timeout` has elapsed while the channel is still pending.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<T>, std::sync::mpsc::RecvTimeoutError> {
        self.0
            .wait_for(timeout)
            .map_err(|_| std::sync::mpsc::RecvTimeoutError::Timeout)
    }

    /// Returns `true` while no value has been sent and the channel is still open.
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }

    /// Registers `f` to receive the value.
    ///
    /// If the value is already available (or the channel is already closed), `f` runs
    /// immediately on the calling thread. Otherwise it runs on the thread that sends the
    /// value or drops the last sender. Only one continuation can observe the value: if
    /// another one is already registered, `f` is called with `None`.
    pub fn on_ready<F>(self, f: F)
    where
        F: FnOnce(Option<T>) + Send + 'static,
    {
        self.0.attach(Box::new(f));
    }
}

struct OneshotCell<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
    senders: AtomicUsize,
}

impl<T> OneshotCell<T> {
    fn new(state: State<T>) -> OneshotCell<T> {
        OneshotCell {
            state: Mutex::new(state),
            condvar: Condvar::new(),
            senders: AtomicUsize::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // The state machine is never left half-updated, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, value: T) -> Result<(), T> {
        let mut guard = self.lock();
        match std::mem::replace(&mut *guard, State::Consumed) {
            State::Pending => {
                *guard = State::Ready(value);
                drop(guard);
                self.condvar.notify_all();
                Ok(())
            }
            State::Continuation(k) => {
                drop(guard);
                self.condvar.notify_all();
                k(Some(value));
                Ok(())
            }
            other => {
                *guard = other;
                Err(value)
            }
        }
    }

    fn attach(&self, k: Continuation<T>) {
        let mut guard = self.lock();
        match std::mem::replace(&mut *guard, State::Consumed) {
            State::Pending => {
                *guard = State::Continuation(k);
            }
            State::Ready(value) => {
                drop(guard);
                k(Some(value));
            }
            State::Consumed => {
                drop(guard);
                k(None);
            }
            State::Continuation(existing) => {
                *guard = State::Continuation(existing);
                drop(guard);
                k(None);
            }
        }
    }

    fn is_pending(&self) -> bool {
        self.lock().is_pending()
    }

    fn cancel(&self) {
        let mut guard = self.lock();
        let continuation = match std::mem::replace(&mut *guard, State::Consumed) {
            State::Pending => None,
            State::Continuation(k) => Some(k),
            other => {
                *guard = other;
                return;
            }
        };
        drop(guard);
        self.condvar.notify_all();
        if let Some(k) = continuation {
            k(None);
        }
    }

    fn wait(&self) -> Option<T> {
        let mut guard = self.lock();
        if !guard.is_pending() {
            return guard.take();
        }

        self.condvar
            .wait_while(guard, |state| state.is_pending())
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn wait_for(&self, timeout: Duration) -> Result<Option<T>, ()> {
        let mut guard = self.lock();
        if !guard.is_pending() {
            return Ok(guard.take());
        }

        let (mut guard, res) = self
            .condvar
            .wait_timeout_while(guard, timeout, |state| state.is_pending())
            .unwrap_or_else(PoisonError::into_inner);
        if res.timed_out() {
            Err(())
        } else {
            guard.try_take()
        }
    }

    fn add_sender(&self) {
        self.senders.fetch_add(1, Ordering::SeqCst);
    }

    fn drop_sender(&self) {
        if self.senders.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.cancel();
        }
    }
}

/// State transitions:
/// - `Pending` -> `Ready(T)` when a value is sent
/// - `Pending` -> `Continuation` when a callback is attached
/// - `Pending` | `Continuation` -> `Consumed` when the channel is closed or the
///   continuation receives the value
/// - `Ready(T)` -> `Consumed` when the value is taken
enum State<T> {
    Pending,
    Continuation(Continuation<T>),
    Ready(T),
    Consumed,
}

impl<T> State<T> {
    fn is_pending(&self) -> bool {
        matches!(self, State::Pending | State::Continuation(_))
    }

    fn try_take(&mut self) -> Result<Option<T>, ()> {
        if self.is_pending() {
            Err(())
        } else {
            Ok(self.take())
        }
    }

    /// # Panics
    ///
    /// Panics if called while the state is still pending.
    fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, State::Consumed) {
            State::Pending | State::Continuation(_) => {
                panic!("State::take() unexpected: value is not ready yet")
            }
            State::Ready(value) => Some(value),
            State::Consumed => None,
        }
    }
}
