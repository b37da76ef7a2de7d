use anyhow::Result;
use parex::execution::{EagerExecutor, Executor, InlineExecutor};

use crate::commands::configure_threads;

pub fn run(threads: Option<usize>) -> Result<()> {
    configure_threads(threads);
    describe(&EagerExecutor::global());
    describe(&InlineExecutor);
    Ok(())
}

fn describe<E: Executor>(executor: &E) {
    println!("{}:", executor.name());
    println!("  parallelism: {}", executor.parallelism());
    println!("  native:      {:?}", executor.capabilities());
    println!("  synthesized: {:?}", executor.synthesized());
}
