//! Thread pool and hand-off primitives underneath the parallel algorithms.
//!
//! # Key Components
//!
//! - [`eager_pool::EagerPool`] - A thread pool that never queues work: when every
//!   worker is busy, a work item runs on the submitting thread instead. Nested
//!   fork-join parallelism therefore cannot starve the pool.
//! - [`oneshot`] - Single-value communication between threads, with completion
//!   callbacks
//! - [`join_handle`] - Handles for waiting on work item results, in `'static` and
//!   scoped variants, plus [`join_handle::promise`] for completing a handle by hand

pub mod eager_pool;
pub mod join_handle;
pub mod oneshot;
mod worker_slots;
