//! # Parex: parallel algorithms under execution policies
//!
//! Parex runs algorithms such as [`generate`] and [`generate_n`] under a small closed
//! set of execution policies against pluggable executors:
//!
//! * **Sequential** (`seq`): in order, on the calling thread
//! * **Parallel** (`par`): the range is split into chunks that run on a worker pool
//! * **Distributed** (`dist`): a segmented range is processed one task per segment
//! * **Deferred** (`*_task`): any of the above, returning a [`Deferred`] handle
//!   instead of blocking
//!
//! Callback failures in parallel runs never take down sibling chunks; they are
//! collected and reported together as one aggregate error once all chunks finished.
//!
//! ## Module Organization
//!
//! * [`common`] - Error types and the `Result` alias
//! * [`parallel`] - Policies, executors, targets, dispatch and the algorithms
//! * [`workflow`] - The eager worker pool, oneshot channels and join handles
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use parex::{generate, generate_n, policy, target::Sequence};
//!
//! let values = Sequence::filled(1000, 0u32);
//! assert_eq!(generate(&policy::par(), values.range(), || 1).unwrap(), 1000);
//!
//! let pending = generate_n(&policy::par_task(), values.range(), 10, || 2);
//! assert_eq!(pending.wait().unwrap(), 10);
//! ```

pub use parex_common as common;
pub use parex_parallel as parallel;
pub use parex_workflow as workflow;

pub use parex_common::{Error, ErrorKind, Result};
pub use parex_parallel::{
    Deferred, Policy, PolicyKind, Target, execution, generate, generate_n, policy, segmented,
    target,
};
