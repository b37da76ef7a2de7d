//! Eager thread pool with fallback to synchronous execution.
//!
//! [`EagerPool`] never queues work: a work item runs on a free worker thread if there is
//! one, and on the caller's thread otherwise. This keeps nested fork-join parallelism
//! safe in non-async code. A work item running on the pool may submit more work and
//! wait for it without starving the pool, because the nested work simply runs inline
//! once every worker is busy.
//!
//! # Execution Strategy
//!
//! 1. **Check availability**: look for a free worker slot
//! 2. **Dispatch to worker**: if one was claimed, send the work item to that worker
//! 3. **Fallback to sync**: otherwise execute the work item on the caller's thread
//!
//! [`EagerPool::launch`] replaces the last step with a dedicated thread, for work the
//! caller must not wait for.
//!
//! A panic inside a work item never takes a worker down: the worker releases its slot
//! and goes back to waiting for work. Callers that need to observe such failures wrap
//! their work items themselves.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, AtomicUsize, Ordering},
        mpsc::{Receiver, SyncSender},
    },
};

use crate::{
    join_handle::{JoinHandle, ScopedJoinHandle},
    oneshot,
    worker_slots::WorkerSlots,
};

/// A thread pool with eager execution semantics and synchronous fallback.
///
/// ```rust,no_run
/// use parex_workflow::eager_pool::EagerPool;
///
/// let pool = EagerPool::new(4);
/// let mut data = vec![0u32; 100];
/// pool.scope(|scope| {
///     for chunk in data.chunks_mut(25) {
///         scope.spawn(move || chunk.fill(1));
///     }
/// });
/// assert!(data.iter().all(|&v| v == 1));
/// ```
///
/// Clones share the same workers. The workers are stopped when the last clone is
/// dropped; work items already running complete.
#[derive(Clone)]
pub struct EagerPool(Arc<PoolHandle>);

impl EagerPool {
    /// Creates a new `EagerPool` with the specified number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> EagerPool {
        assert_ne!(num_threads, 0);
        EagerPool(Arc::new(PoolHandle {
            workers: Workers::new(num_threads),
        }))
    }

    /// Configures the size of the global pool.
    ///
    /// Only takes effect when called before the first call to [`global()`](Self::global).
    /// Values less than 1 are clamped to 1.
    pub fn configure_global_pool_size(pool_size: usize) {
        let pool_size = pool_size.max(1);
        GLOBAL_POOL_SIZE.store(pool_size, Ordering::SeqCst);
    }

    /// Returns the lazily initialized global pool.
    ///
    /// The pool size is the value set by
    /// [`configure_global_pool_size()`](Self::configure_global_pool_size), or
    /// `ceil(available_parallelism * 1.5)`, or 8 if the parallelism cannot be determined.
    pub fn global() -> &'static EagerPool {
        static POOL: OnceLock<EagerPool> = OnceLock::new();
        POOL.get_or_init(|| EagerPool::new(Self::get_global_pool_size()))
    }

    /// Number of worker threads owned by the pool.
    pub fn num_threads(&self) -> usize {
        self.0.workers.slots.len()
    }

    /// Executes a closure on a free worker thread, or on the caller's thread when every
    /// worker is busy.
    pub fn spawn<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let workers = &self.0.workers;
        if let Some(index) = workers.try_reserve() {
            let (tx, rx) = oneshot::channel::<R>();
            let work_fn = move || {
                let res = f();
                let _ = tx.send(res);
            };
            workers.spawn(index, Box::new(work_fn));
            JoinHandle::new(rx)
        } else {
            let res = f();
            JoinHandle::ready(res)
        }
    }

    /// Executes a closure on a free worker thread, or on a dedicated thread when every
    /// worker is busy. Unlike [`spawn`](Self::spawn), the caller never runs `f` itself.
    ///
    /// If no thread can be started, the closure is dropped and the handle reports an
    /// abandoned work item.
    pub fn launch<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<R>();
        let work_fn = move || {
            let res = f();
            let _ = tx.send(res);
        };
        let workers = &self.0.workers;
        if let Some(index) = workers.try_reserve() {
            workers.spawn(index, Box::new(work_fn));
        } else {
            workers.launch_counter.fetch_add(1, Ordering::Relaxed);
            let _ = std::thread::Builder::new()
                .name("parex-launch".to_string())
                .spawn(work_fn);
        }
        JoinHandle::new(rx)
    }

    /// Creates a scope for executing non-`'static` closures.
    ///
    /// All work items spawned within the scope are complete when this method returns.
    pub fn scope<'env, F, R>(&self, f: F) -> R
    where
        F: for<'scope> FnOnce(&'scope Scope<'scope, 'env>) -> R,
    {
        self.run_scope(ScopeTracker::new(), f)
    }

    /// Creates a scope that runs at most `max_parallel_tasks` work items at once,
    /// counting the caller's thread. Work items beyond the limit run on the caller's
    /// thread.
    pub fn restricted_scope<'env, F, R>(&self, max_parallel_tasks: usize, f: F) -> R
    where
        F: for<'scope> FnOnce(&'scope Scope<'scope, 'env>) -> R,
    {
        // The caller's thread always takes part, so the workers get one slot less.
        let max_parallel_tasks = std::cmp::max(max_parallel_tasks, 1) - 1;
        self.run_scope(ScopeTracker::restricted(max_parallel_tasks), f)
    }

    /// Total number of work items dispatched to worker threads (as opposed to running
    /// on the caller's thread) since the pool was created.
    pub fn spawn_counter(&self) -> usize {
        self.0.workers.spawn_counter.load(Ordering::Relaxed)
    }

    /// Number of [`launch`](Self::launch)ed work items that got a dedicated thread
    /// because every worker was busy.
    pub fn launch_counter(&self) -> usize {
        self.0.workers.launch_counter.load(Ordering::Relaxed)
    }

    fn run_scope<'env, F, R>(&self, tracker: Arc<ScopeTracker>, f: F) -> R
    where
        F: for<'scope> FnOnce(&'scope Scope<'scope, 'env>) -> R,
    {
        let scope = Scope {
            workers: self.0.workers.clone(),
            tracker,
            scope: std::marker::PhantomData,
            env: std::marker::PhantomData,
        };
        // Work items borrow from 'env, so they must finish even if `f` unwinds.
        let res = std::panic::catch_unwind(AssertUnwindSafe(|| f(&scope)));
        scope.tracker.wait();
        match res {
            Ok(res) => res,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn get_global_pool_size() -> usize {
        let size = GLOBAL_POOL_SIZE.load(Ordering::SeqCst);
        if size == 0 {
            std::thread::available_parallelism()
                .map(|n| (n.get() * 3).div_ceil(2))
                .unwrap_or(8)
        } else {
            size
        }
    }
}

/// Owned by the `EagerPool` clones; the worker threads only hold `Workers`.
struct PoolHandle {
    workers: Arc<Workers>,
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        self.workers.stop();
    }
}

/// A scope for executing non-`'static` closures.
///
/// A work item runs on a worker thread only if both the scope's parallelism limit and
/// the pool have room for it; otherwise it runs synchronously on the caller's thread.
pub struct Scope<'scope, 'env: 'scope> {
    workers: Arc<Workers>,
    tracker: Arc<ScopeTracker>,
    scope: std::marker::PhantomData<&'scope mut &'scope ()>,
    env: std::marker::PhantomData<&'env mut &'env ()>,
}

impl<'scope, 'env> Scope<'scope, 'env> {
    pub fn spawn<F, R>(&'scope self, f: F) -> ScopedJoinHandle<'scope, R>
    where
        F: FnOnce() -> R + Send + 'scope,
        R: Send + 'scope,
    {
        if self.tracker.try_reserve() {
            if let Some(index) = self.workers.try_reserve() {
                self.tracker.task_spawned();
                let completion = CompletionGuard(self.tracker.clone());
                let (tx, rx) = oneshot::channel::<R>();
                let work_fn = move || {
                    let _completion = completion;
                    let res = f();
                    let _ = tx.send(res);
                };
                let work_fn = Box::into_raw(Box::new(work_fn) as Box<dyn FnOnce() + Send + 'scope>);
                // casting away the 'scope lifetime: the scope waits for every work item
                // before 'scope ends.
                let work_fn =
                    unsafe {
                    Box::from_raw(std::mem::transmute::<
                        *mut (dyn FnOnce() + Send + 'scope),
                        *mut (dyn FnOnce() + Send + 'static),
                    >(work_fn))
                };
                self.workers.spawn(index, work_fn);
                return ScopedJoinHandle::new(rx);
            }
            self.tracker.release_reservation();
        }

        let res = f();
        ScopedJoinHandle::ready(res)
    }
}

static GLOBAL_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);

type WorkItem = Box<dyn FnOnce() + Send + 'static>;

struct Workers {
    threads: Vec<Worker>,
    slots: WorkerSlots,
    spawn_counter: AtomicUsize,
    launch_counter: AtomicUsize,
}

impl Workers {
    fn new(num_threads: usize) -> Arc<Workers> {
        let (threads, channels) = (0..num_threads)
            .map(|_| Worker::new())
            .unzip::<_, _, Vec<_>, Vec<_>>();
        let this = Arc::new(Workers {
            threads,
            slots: WorkerSlots::new(num_threads),
            spawn_counter: AtomicUsize::new(0),
            launch_counter: AtomicUsize::new(0),
        });
        channels.into_iter().enumerate().for_each(|(i, rx)| {
            let this = this.clone();
            std::thread::Builder::new()
                .name(format!("parex-eager-{i}"))
                .spawn(move || Self::thread_fn(this, i, rx))
                .expect("spawn thread");
        });
        this
    }

    fn try_reserve(&self) -> Option<usize> {
        self.slots.try_claim()
    }

    fn spawn(&self, reserved_index: usize, work: WorkItem) {
        assert!(self.slots.is_claimed(reserved_index));
        self.spawn_counter.fetch_add(1, Ordering::Relaxed);
        self.threads[reserved_index]
            .tx
            .send(Message::Work(work))
            .expect("send");
    }

    fn stop(&self) {
        self.threads.iter().for_each(|t| {
            let _ = t.tx.send(Message::Stop);
        });
    }

    fn thread_fn(workers: Arc<Workers>, index: usize, rx: Receiver<Message>) {
        while let Ok(msg) = rx.recv() {
            match msg {
                Message::Work(f) => {
                    // The work item reports its own outcome; a panic only has to leave
                    // the worker usable.
                    let _ = std::panic::catch_unwind(AssertUnwindSafe(f));
                    workers.slots.release(index);
                }
                Message::Stop => return,
            }
        }
    }
}

struct Worker {
    tx: SyncSender<Message>,
}

impl Worker {
    fn new() -> (Worker, Receiver<Message>) {
        let (tx, rx) = std::sync::mpsc::sync_channel::<Message>(4);
        (Worker { tx }, rx)
    }
}

enum Message {
    Work(WorkItem),
    Stop,
}

/// Marks a scoped work item as completed when dropped, including during unwinding.
struct CompletionGuard(Arc<ScopeTracker>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.task_completed();
    }
}

struct ScopeTracker {
    /// Counter of running tasks combined with the `WAIT_STATE`.
    state: AtomicU64,
    /// Completion "event"
    completion: OnceLock<()>,
    /// Counter of running (parallel) tasks for the `max_tasks` enforcement.
    current_tasks: AtomicUsize,
    /// Max number of running (parallel) tasks.
    max_tasks: usize,
}

impl ScopeTracker {
    const WAIT_STATE: u64 = 0x8000000000000000;

    fn new() -> Arc<ScopeTracker> {
        Self::restricted(usize::MAX)
    }

    fn restricted(max_tasks: usize) -> Arc<ScopeTracker> {
        Arc::new(ScopeTracker {
            state: AtomicU64::new(0),
            completion: OnceLock::new(),
            current_tasks: AtomicUsize::new(0),
            max_tasks,
        })
    }

    fn try_reserve(&self) -> bool {
        if self.current_tasks.fetch_add(1, Ordering::Relaxed) >= self.max_tasks {
            self.current_tasks.fetch_sub(1, Ordering::Relaxed);
            false
        } else {
            true
        }
    }

    fn release_reservation(&self) {
        self.current_tasks.fetch_sub(1, Ordering::Relaxed);
    }

    fn task_spawned(&self) {
        let prev_state = self.state.fetch_add(1, Ordering::SeqCst);
        assert!(prev_state < Self::WAIT_STATE);
    }

    fn task_completed(&self) {
        self.current_tasks.fetch_sub(1, Ordering::Relaxed);
        let prev_state = self.state.fetch_sub(1, Ordering::SeqCst);
        debug_assert_ne!(prev_state, 0);
        debug_assert_ne!(prev_state, Self::WAIT_STATE);
        if prev_state > Self::WAIT_STATE && prev_state - Self::WAIT_STATE == 1 {
            let _ = self.completion.set(());
        }
    }

    fn wait(&self) {
        let prev_state = self.state.fetch_add(Self::WAIT_STATE, Ordering::SeqCst);
        assert!(prev_state < Self::WAIT_STATE);
        if prev_state == 0 {
            return;
        }
        self.completion.wait();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use crate::join_handle::JoinHandle;

    use super::EagerPool;

    #[test]
    fn test_eager_pool() {
        let pool = EagerPool::new(4);
        let current_id = std::thread::current().id();
        let worker_id = pool.spawn(|| std::thread::current().id()).join();
        assert_ne!(current_id, worker_id);

        let h = (0..4)
            .map(|_| pool.spawn(|| std::thread::sleep(Duration::from_millis(50))))
            .collect::<Vec<_>>();
        let worker_id = pool.spawn(|| std::thread::current().id()).join();
        JoinHandle::join_all(h);
        assert_eq!(worker_id, current_id);

        let a = vec![10u32; 50];
        let mut b = vec![0u32; 100];
        pool.scope(|scope| {
            let (b0, b1) = b.split_at_mut(50);
            scope.spawn(|| b0.copy_from_slice(&a));
            scope.spawn(|| b1.copy_from_slice(&a));
        });
        assert_eq!(&a, &b[0..50]);
        assert_eq!(&a, &b[50..100]);

        let prev_spawned = pool.spawn_counter();
        pool.restricted_scope(2, |scope| {
            scope.spawn(|| std::thread::sleep(Duration::from_millis(50)));
            scope.spawn(|| std::thread::sleep(Duration::from_millis(50)));
        });
        let spawned = pool.spawn_counter();
        assert_eq!(spawned - prev_spawned, 1);
    }

    #[test]
    fn test_clone_drop_keeps_workers() {
        let pool = EagerPool::new(2);
        drop(pool.clone());
        let current_id = std::thread::current().id();
        let worker_id = pool.spawn(|| std::thread::current().id()).join();
        assert_ne!(current_id, worker_id);
    }

    #[test]
    fn test_worker_survives_panic() {
        let pool = EagerPool::new(1);
        let handle = pool.spawn(|| -> u32 { panic!("work item failure") });
        assert_eq!(handle.try_join(), None);

        // The slot is released right after the result channel closes.
        std::thread::sleep(Duration::from_millis(50));
        let current_id = std::thread::current().id();
        let worker_id = pool.spawn(|| std::thread::current().id()).join();
        assert_ne!(current_id, worker_id);
    }

    #[test]
    fn test_scope_waits_for_panicking_item() {
        let pool = EagerPool::new(2);
        let done = AtomicUsize::new(0);
        pool.scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
                panic!("scoped failure");
            });
            scope.spawn(|| {
                done.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nested_scopes_do_not_starve() {
        let pool = EagerPool::new(2);
        let total = AtomicUsize::new(0);
        pool.scope(|outer| {
            for _ in 0..4 {
                outer.spawn(|| {
                    pool.scope(|inner| {
                        for _ in 0..4 {
                            inner.spawn(|| total.fetch_add(1, Ordering::SeqCst));
                        }
                    });
                });
            }
        });
        assert_eq!(total.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_launch_never_runs_on_caller() {
        let pool = EagerPool::new(1);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let busy = pool.spawn(move || release_rx.recv().is_ok());

        let current_id = std::thread::current().id();
        let handle = pool.launch(|| std::thread::current().id());
        assert_ne!(handle.join(), current_id);
        assert_eq!(pool.launch_counter(), 1);

        release_tx.send(()).unwrap();
        assert!(busy.join());
    }
}
