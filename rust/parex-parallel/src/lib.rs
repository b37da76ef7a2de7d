//! Parallel algorithms under execution policies.
//!
//! An algorithm call takes a [`Policy`], a [`Target`] and the algorithm's arguments.
//! The policy decides how the work is scheduled ([`policy::Scheduling`]), what executor
//! runs it ([`execution::Executor`]) and whether the call blocks or returns a
//! [`Deferred`] handle ([`future::ResultShape`]).
//!
//! ```rust,no_run
//! use parex_parallel::{generate, policy, target::Sequence};
//!
//! let values = Sequence::filled(1000, 0u32);
//! let end = generate(&policy::par(), values.range(), || 1).unwrap();
//! assert_eq!(end, 1000);
//!
//! let pending = generate(&policy::par_task(), values.range(), || 2);
//! assert_eq!(pending.wait().unwrap(), 1000);
//! ```
//!
//! Failures of the user callbacks are panics. Parallel runs capture them per chunk and
//! report all of them together as an aggregate error once every chunk has finished; see
//! [`exception_list`].

pub mod algorithms;
pub mod dispatch;
pub mod exception_list;
pub mod execution;
pub mod future;
pub mod partitioner;
pub mod policy;
pub mod segmented;
pub mod target;

pub use algorithms::{generate, generate_n};
pub use future::{Deferred, Eager, Task};
pub use policy::{Policy, PolicyKind};
pub use target::Target;
