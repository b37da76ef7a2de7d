use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use parex::{
    Error, ErrorKind, Policy, PolicyKind, generate, generate_n,
    common::Failure,
    execution::{EagerExecutor, Executor, InlineExecutor},
    parallel::future::{Eager, ResultShape},
    policy::Scheduling,
    segmented::SegmentedSequence,
    target::Sequence,
};

use crate::commands::configure_threads;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PolicyArg {
    Seq,
    SeqTask,
    Par,
    ParTask,
    Dist,
    DistTask,
}

impl PolicyArg {
    fn scheduling(self) -> Scheduling {
        match self {
            PolicyArg::Seq | PolicyArg::SeqTask => Scheduling::Sequential,
            PolicyArg::Par | PolicyArg::ParTask => Scheduling::Parallel,
            PolicyArg::Dist | PolicyArg::DistTask => Scheduling::Distributed,
        }
    }

    fn is_deferred(self) -> bool {
        matches!(
            self,
            PolicyArg::SeqTask | PolicyArg::ParTask | PolicyArg::DistTask
        )
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ExecutorArg {
    Eager,
    Inline,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Execution policy
    #[arg(long, value_enum, default_value_t = PolicyArg::Par)]
    policy: PolicyArg,

    /// Number of elements in the target sequence
    #[arg(long, default_value_t = 1_000_000)]
    len: usize,

    /// Run generate_n with this count instead of generate over the whole sequence
    #[arg(long, allow_negative_numbers = true)]
    count: Option<i64>,

    /// Elements per chunk (defaults to about four chunks per worker)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Worker threads of the global eager pool
    #[arg(long)]
    threads: Option<usize>,

    /// Spread the sequence over this many partitions (0 keeps it in one piece)
    #[arg(long, default_value_t = 0)]
    segments: usize,

    /// Backend the work is submitted to
    #[arg(long, value_enum, default_value_t = ExecutorArg::Eager)]
    executor: ExecutorArg,

    /// Make every n-th generator call panic
    #[arg(long)]
    fail_every: Option<u64>,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    configure_threads(args.threads);
    if args.fail_every.is_some() {
        // Failures are reported through the aggregate error.
        std::panic::set_hook(Box::new(|info| log::debug!("generator panicked: {info}")));
    }

    match args.executor {
        ExecutorArg::Eager => run_on(&args, EagerExecutor::global()),
        ExecutorArg::Inline => run_on(&args, InlineExecutor),
    }
}

fn run_on<E: Executor>(args: &GenerateArgs, executor: E) -> Result<()> {
    let mut policy = Policy::<Eager, E>::new(args.policy.scheduling(), executor);
    if let Some(chunk_size) = args.chunk_size {
        policy = policy.with_chunk_size(chunk_size);
    }

    let storage = Storage::new(args.len, args.segments);
    let calls = Arc::new(AtomicU64::new(0));
    let generator = counting_generator(calls.clone(), args.fail_every);

    let started = Instant::now();
    let outcome = if args.policy.is_deferred() {
        let policy = policy.clone().with_deferred();
        let pending = storage.run(&policy, args.count, generator);
        log::debug!("{} returned after {:?}", policy.kind(), started.elapsed());
        pending.wait()
    } else {
        let algorithm = if args.count.is_some() { "generate_n" } else { "generate" };
        catch_failure(algorithm, || storage.run(&policy, args.count, generator))
    };
    let elapsed = started.elapsed();

    let values = storage.values();
    let written = values.iter().filter(|&&v| v != 0).count();
    println!(
        "policy: {}, executor: {}, layout: {}",
        PolicyKind::new(args.policy.scheduling(), args.policy.is_deferred()),
        args.executor.name(),
        storage.describe()
    );
    println!("generator calls: {}", calls.load(Ordering::SeqCst));
    println!("elements written: {written} of {}", values.len());
    println!("elapsed: {elapsed:?}");

    match outcome {
        Ok(end) => {
            println!("end position: {end}");
            Ok(())
        }
        Err(e) => {
            match e.kind() {
                ErrorKind::Aggregate(aggregate) => {
                    println!("failed chunks: {}", aggregate.len());
                }
                ErrorKind::Failed { failure, .. } => println!("failed: {failure}"),
                _ => (),
            }
            Err(e).context("generation failed")
        }
    }
}

impl ExecutorArg {
    fn name(self) -> &'static str {
        match self {
            ExecutorArg::Eager => "eager",
            ExecutorArg::Inline => "inline",
        }
    }
}

/// Sequential eager runs let a failing generator unwind to the caller; the report
/// needs it as an error.
fn catch_failure<F>(algorithm: &'static str, f: F) -> parex::Result<usize>
where
    F: FnOnce() -> parex::Result<usize>,
{
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(Error::failed(algorithm, Failure::from_panic(payload, None)))
    })
}

/// Produces 1, 2, 3, ... and panics on every `fail_every`-th call.
fn counting_generator(
    calls: Arc<AtomicU64>,
    fail_every: Option<u64>,
) -> impl Fn() -> u64 + Send + Sync + 'static {
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(every) = fail_every.filter(|&every| every > 0) {
            if n % every == 0 {
                panic!("generator call {n} failed");
            }
        }
        n
    }
}

enum Storage {
    Plain(Sequence<u64>),
    Segmented(SegmentedSequence<u64>),
}

impl Storage {
    fn new(len: usize, segments: usize) -> Storage {
        if segments == 0 {
            Storage::Plain(Sequence::filled(len, 0))
        } else {
            Storage::Segmented(SegmentedSequence::split(vec![0; len], segments))
        }
    }

    fn run<S, E, G>(
        &self,
        policy: &Policy<S, E>,
        count: Option<i64>,
        generator: G,
    ) -> S::Output<usize>
    where
        S: ResultShape,
        E: Executor,
        G: Fn() -> u64 + Send + Sync + 'static,
    {
        match (self, count) {
            (Storage::Plain(seq), None) => generate(policy, seq.range(), generator),
            (Storage::Plain(seq), Some(count)) => {
                generate_n(policy, seq.range(), count, generator)
            }
            (Storage::Segmented(seq), None) => generate(policy, seq.range(), generator),
            (Storage::Segmented(seq), Some(count)) => {
                generate_n(policy, seq.range(), count, generator)
            }
        }
    }

    fn values(&self) -> Vec<u64> {
        match self {
            Storage::Plain(seq) => seq.to_vec(),
            Storage::Segmented(seq) => seq.to_vec(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Storage::Plain(_) => "plain".to_string(),
            Storage::Segmented(seq) => format!("{} segment(s)", seq.num_partitions()),
        }
    }
}
