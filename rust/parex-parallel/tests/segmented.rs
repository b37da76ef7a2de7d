use std::sync::atomic::{AtomicUsize, Ordering};

use parex_common::ErrorKind;
use parex_parallel::{
    generate, generate_n,
    execution::{EagerExecutor, InlineExecutor},
    policy::{self, Scheduling},
    segmented::{LocalityId, SegmentedRange, SegmentedSequence},
    target::Sequence,
};
use parex_workflow::eager_pool::EagerPool;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_segmented_generate_matches_plain() {
    init_logging();
    for scheduling in [Scheduling::Sequential, Scheduling::Parallel, Scheduling::Distributed] {
        for segments in [1, 3, 8] {
            let len = fastrand::usize(1..500);
            let plain = Sequence::filled(len, 0u32);
            let p = policy::par().with_scheduling(scheduling).with_chunk_size(16);
            let plain_end = generate(&p, plain.range(), || 11).unwrap();

            let segmented = SegmentedSequence::split(vec![0u32; len], segments);
            let end = generate(&p, segmented.range(), || 11).unwrap();

            assert_eq!(end, plain_end);
            assert_eq!(segmented.to_vec(), plain.to_vec());
        }
    }
}

#[test]
fn test_end_is_translated_to_global_space() {
    init_logging();
    let storage = SegmentedSequence::from_parts(vec![
        (LocalityId(0), vec![0u8; 5]),
        (LocalityId(1), vec![0u8; 5]),
        (LocalityId(2), vec![0u8; 5]),
    ]);
    // Starts inside the first partition and ends inside the last one.
    let range = SegmentedRange::new(storage.clone(), 3..12);
    let end = generate(&policy::dist(), range, || 1).unwrap();
    assert_eq!(end, 12);
    assert_eq!(
        storage.to_vec(),
        vec![0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0]
    );

    let range = SegmentedRange::new(storage.clone(), 3..12);
    let end = generate_n(&policy::par(), range, 4, || 2).unwrap();
    assert_eq!(end, 7);
    assert_eq!(&storage.to_vec()[3..8], &[2, 2, 2, 2, 1]);
}

#[test]
fn test_empty_segmented_range_returns_begin() {
    init_logging();
    let storage = SegmentedSequence::split(vec![0u8; 6], 2);
    let range = SegmentedRange::new(storage.clone(), 4..4);
    assert_eq!(generate(&policy::dist(), range, || 1).unwrap(), 4);
    assert_eq!(storage.to_vec(), vec![0; 6]);
}

#[test]
fn test_distributed_failures_aggregate_across_segments() {
    init_logging();
    let executor = EagerExecutor::new(EagerPool::new(4));
    let storage = SegmentedSequence::split(vec![0u32; 40], 4);
    let calls = AtomicUsize::new(0);
    let fail_every_4th = move || {
        if calls.fetch_add(1, Ordering::SeqCst) % 4 == 0 {
            panic!("segment failure");
        }
        1
    };
    let p = policy::dist().on(executor).with_chunk_size(1);
    let err = generate(&p, storage.range(), fail_every_4th).unwrap_err();
    match err.kind() {
        ErrorKind::Aggregate(aggregate) => {
            assert_eq!(aggregate.len(), 10);
            assert_eq!(aggregate.algorithm(), "generate");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(storage.to_vec().iter().filter(|&&v| v == 1).count(), 30);
}

#[test]
fn test_distributed_deferred() {
    init_logging();
    let storage = SegmentedSequence::split(vec![0i64; 100], 5);
    let deferred = generate(&policy::dist_task().with_chunk_size(7), storage.range(), || 3);
    assert_eq!(deferred.wait().unwrap(), 100);
    assert_eq!(storage.to_vec(), vec![3; 100]);

    let storage = SegmentedSequence::split(vec![0i64; 10], 3);
    let p = policy::dist_task().on(InlineExecutor);
    let deferred = generate_n(&p, storage.range(), 10, || 4);
    assert!(deferred.is_ready());
    assert_eq!(deferred.wait().unwrap(), 10);
    assert_eq!(storage.to_vec(), vec![4; 10]);
}

#[test]
fn test_generate_n_beyond_segmented_range_is_rejected() {
    init_logging();
    let storage = SegmentedSequence::split(vec![0u8; 6], 3);
    let err = generate_n(&policy::par(), storage.range(), 7, || 1).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    assert_eq!(storage.to_vec(), vec![0; 6]);
}
