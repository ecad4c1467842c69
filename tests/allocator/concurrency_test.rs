/*!
 * Concurrency Tests
 * Many threads allocating and releasing through one allocator
 */

use lifetime_alloc::memory::{
    AllocatorConfig, HashClassifier, LifetimeAllocator, LifetimeClass, MemoryError,
    ReclaimPolicy, ReleaseOutcome, SimulatedProvider, SyncDaemon,
};
use lifetime_alloc::init_tracing;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;
const PAIRS_PER_THREAD: usize = 10_000;

fn shared_allocator() -> (Arc<LifetimeAllocator>, Arc<SimulatedProvider>) {
    let provider = Arc::new(SimulatedProvider::new());
    let allocator = LifetimeAllocator::builder()
        .classifier(HashClassifier::new())
        .shared_provider(provider.clone())
        .build()
        .unwrap();
    (Arc::new(allocator), provider)
}

#[test]
fn test_parallel_alloc_release_pairs() {
    init_tracing();
    let (allocator, provider) = shared_allocator();
    let baseline = allocator.stats();
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let allocator = allocator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let ledger = allocator.ledger();
                barrier.wait();
                for i in 0..PAIRS_PER_THREAD {
                    let context = format!("worker-{}-site-{}", t, i % 17);
                    let size = 16 + (i % 8) * 8;
                    let handle = allocator.allocate(&ledger, size, context).unwrap();
                    assert_eq!(
                        allocator.release(&ledger, handle).unwrap(),
                        ReleaseOutcome::Reclaimed
                    );
                }
                assert!(ledger.is_empty());
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let stats = allocator.stats();
    assert_eq!(stats.regions, baseline.regions, "every region back to baseline");
    assert_eq!(stats.allocations, (THREADS * PAIRS_PER_THREAD) as u64);
    assert_eq!(stats.reclaimed_blocks, (THREADS * PAIRS_PER_THREAD) as u64);
    assert_eq!(stats.rejected_releases, 0);

    let provider_stats = provider.stats();
    assert_eq!(provider_stats.double_releases, 0);
    assert_eq!(provider_stats.live_addresses, 0);
    assert_eq!(provider_stats.used, 0);
}

#[test]
fn test_interleaved_shared_references() {
    let (allocator, provider) = shared_allocator();

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let allocator = allocator.clone();
            thread::spawn(move || {
                let ledger = allocator.ledger();
                let mut held = Vec::new();
                for i in 0..500 {
                    let handle = allocator
                        .allocate(&ledger, 32, format!("t{}-{}", t, i % 5))
                        .unwrap();
                    allocator.retain(&ledger, &handle).unwrap();
                    held.push(handle);
                }
                for handle in &held {
                    assert!(matches!(
                        allocator.release(&ledger, *handle).unwrap(),
                        ReleaseOutcome::Deferred { remaining: 1 }
                    ));
                }
                for handle in held {
                    assert_eq!(
                        allocator.release(&ledger, handle).unwrap(),
                        ReleaseOutcome::Reclaimed
                    );
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(allocator.regions().total_live(), 0);
    assert_eq!(provider.stats().double_releases, 0);
}

#[test]
fn test_randomized_mixed_workload() {
    let (allocator, provider) = shared_allocator();

    let workers: Vec<_> = (0..THREADS as u64)
        .map(|seed| {
            let allocator = allocator.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let ledger = allocator.ledger();
                let mut held = Vec::new();
                for _ in 0..2_000 {
                    if held.is_empty() || rng.gen_bool(0.55) {
                        let size = rng.gen_range(0..1024);
                        let site = rng.gen_range(0..32);
                        let handle = allocator
                            .allocate(&ledger, size, format!("site-{}", site))
                            .unwrap();
                        held.push(handle);
                    } else {
                        let index = rng.gen_range(0..held.len());
                        let handle = held.swap_remove(index);
                        allocator.release(&ledger, handle).unwrap();
                    }
                    if rng.gen_ratio(1, 100) {
                        allocator.synchronize();
                    }
                }
                for handle in held {
                    allocator.release(&ledger, handle).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(allocator.regions().total_live(), 0);
    assert_eq!(allocator.stats().rejected_releases, 0);
    assert_eq!(provider.stats().double_releases, 0);
    assert_eq!(provider.stats().used, 0);
}

#[test]
fn test_batched_workers_exiting_with_retired_blocks() {
    let provider = Arc::new(SimulatedProvider::new());
    let allocator = Arc::new(
        LifetimeAllocator::builder()
            .classifier(HashClassifier::new())
            .shared_provider(provider.clone())
            .config(AllocatorConfig::default().with_reclaim(ReclaimPolicy::Batched { batch_size: 64 }))
            .build()
            .unwrap(),
    );
    let main = allocator.ledger();
    // Every worker registers before any exits, so registration reclaims nothing early
    let registered = Arc::new(Barrier::new(4));

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let allocator = allocator.clone();
            let registered = registered.clone();
            thread::spawn(move || {
                let ledger = allocator.ledger();
                registered.wait();
                (0..10)
                    .map(|i| {
                        let handle = allocator
                            .allocate(&ledger, 32, format!("exit-{}-{}", t, i))
                            .unwrap();
                        assert_eq!(
                            allocator.release(&ledger, handle).unwrap(),
                            ReleaseOutcome::Retired
                        );
                        handle
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let handles: Vec<_> = workers
        .into_iter()
        .flat_map(|worker| worker.join().unwrap())
        .collect();

    let report = allocator.synchronize();
    assert_eq!(report.ledgers_pruned, 4);
    assert_eq!(allocator.regions().total_live(), 40, "synchronize leaves regions alone");
    assert_eq!(
        allocator.release(&main, handles[0]),
        Err(MemoryError::UseAfterReclaim { block: handles[0].id() })
    );

    assert_eq!(allocator.flush(&main).unwrap(), 40);
    assert_eq!(allocator.regions().total_live(), 0);
    assert_eq!(provider.stats().live_addresses, 0);
    assert_eq!(provider.stats().double_releases, 0);
}

#[test]
fn test_drain_during_allocation_leaves_nothing_behind() {
    let (allocator, provider) = shared_allocator();
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let allocator = allocator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let ledger = allocator.ledger();
                barrier.wait();
                let mut held = 0usize;
                loop {
                    match allocator.allocate(&ledger, 48, format!("race-{}", t)) {
                        Ok(_) => held += 1,
                        Err(MemoryError::Closed | MemoryError::OutOfMemory { .. }) => break,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                held
            })
        })
        .collect();

    barrier.wait();
    thread::sleep(Duration::from_millis(5));
    allocator.drain();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(allocator.regions().total_live(), 0);
    assert_eq!(provider.stats().live_addresses, 0);
    assert_eq!(provider.stats().double_releases, 0);
}

#[test]
fn test_release_from_another_thread_is_rejected() {
    let (allocator, _provider) = shared_allocator();
    let ledger = allocator.ledger();
    let handle = allocator.allocate(&ledger, 64, "owned").unwrap();

    let remote = {
        let allocator = allocator.clone();
        thread::spawn(move || {
            let other = allocator.ledger();
            let result = allocator.release(&other, handle);
            (other.id(), result)
        })
    };
    let (other_id, result) = remote.join().unwrap();

    assert_eq!(
        result,
        Err(MemoryError::CrossThreadRelease {
            block: handle.id(),
            ledger: other_id
        })
    );
    assert!(allocator.contains(&handle));
    assert_eq!(
        allocator.release(&ledger, handle).unwrap(),
        ReleaseOutcome::Reclaimed
    );
}

#[test]
fn test_ledger_can_move_between_threads() {
    let (allocator, _provider) = shared_allocator();
    let ledger = allocator.ledger();
    let handle = allocator.allocate(&ledger, 128, "moved").unwrap();

    let mover = {
        let allocator = allocator.clone();
        thread::spawn(move || allocator.release(&ledger, handle))
    };
    assert_eq!(mover.join().unwrap().unwrap(), ReleaseOutcome::Reclaimed);
    assert_eq!(allocator.live_count(handle.class()), 0);
}

#[test]
fn test_sync_daemon_runs_alongside_workers() {
    let (allocator, provider) = shared_allocator();
    let daemon = SyncDaemon::spawn(allocator.clone(), Duration::from_millis(1)).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let allocator = allocator.clone();
            thread::spawn(move || {
                let ledger = allocator.ledger();
                for i in 0..2_000 {
                    let handle = allocator
                        .allocate(&ledger, 24, format!("daemon-{}-{}", t, i % 3))
                        .unwrap();
                    allocator.release(&ledger, handle).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    thread::sleep(Duration::from_millis(20));
    let passes = daemon.stop();
    assert!(passes > 0);
    assert!(allocator.stats().sync_passes >= passes);
    assert_eq!(allocator.regions().total_live(), 0);
    assert_eq!(provider.stats().double_releases, 0);
}

#[test]
fn test_sync_daemon_exits_after_drain() {
    let (allocator, _provider) = shared_allocator();
    let daemon = SyncDaemon::spawn(allocator.clone(), Duration::from_millis(1)).unwrap();

    let ledger = allocator.ledger();
    allocator.allocate(&ledger, 8, "left").unwrap();
    let report = allocator.drain();
    assert_eq!(report.reclaimed.len(), 1);

    // The loop notices the closed allocator on its next tick
    thread::sleep(Duration::from_millis(20));
    daemon.stop();
    assert_eq!(allocator.allocate(&ledger, 8, "late"), Err(MemoryError::Closed));
    for class in LifetimeClass::ALL {
        assert_eq!(allocator.live_count(class), 0);
    }
}
