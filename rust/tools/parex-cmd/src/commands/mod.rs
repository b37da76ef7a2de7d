//! Command implementations for parex-cmd

use parex::workflow::eager_pool::EagerPool;

pub mod executors;
pub mod generate;

/// Sizes the global eager pool. Must run before anything touches the pool.
pub fn configure_threads(threads: Option<usize>) {
    if let Some(threads) = threads {
        log::debug!("global pool size set to {threads}");
        EagerPool::configure_global_pool_size(threads);
    }
}
