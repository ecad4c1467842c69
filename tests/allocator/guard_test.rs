/*!
 * Block Guard Tests
 */

use lifetime_alloc::memory::{
    BlockGuardExt, FixedClassifier, LifetimeAllocator, LifetimeClass, ReleaseOutcome,
    SimulatedProvider,
};
use pretty_assertions::assert_eq;

fn allocator() -> LifetimeAllocator {
    LifetimeAllocator::new(FixedClassifier(LifetimeClass::Short), SimulatedProvider::new())
}

#[test]
fn test_guard_releases_on_drop() {
    let allocator = allocator();
    let ledger = allocator.ledger();

    let handle = {
        let guard = allocator.allocate_guard(&ledger, 96, "scoped").unwrap();
        assert_eq!(guard.size(), 96);
        assert_eq!(guard.class(), LifetimeClass::Short);
        assert!(allocator.contains(&guard.handle()));
        guard.handle()
    };

    assert!(!allocator.contains(&handle));
    assert!(ledger.is_empty());
}

#[test]
fn test_shared_guards_release_last_reference() {
    let allocator = allocator();
    let ledger = allocator.ledger();

    let first = allocator.allocate_guard(&ledger, 32, "").unwrap();
    let second = first.share().unwrap();
    let handle = first.handle();
    assert_eq!(second.address(), first.address());
    assert_eq!(ledger.pending(&handle), Some(2));

    drop(first);
    assert_eq!(ledger.pending(&handle), Some(1));
    assert!(allocator.contains(&handle));

    assert_eq!(second.release().unwrap(), ReleaseOutcome::Reclaimed);
    assert!(!allocator.contains(&handle));
}

#[test]
fn test_into_handle_disarms_guard() {
    let allocator = allocator();
    let ledger = allocator.ledger();

    let handle = allocator
        .allocate_guard(&ledger, 8, "")
        .unwrap()
        .into_handle();
    assert!(allocator.contains(&handle));
    assert_eq!(
        allocator.release(&ledger, handle).unwrap(),
        ReleaseOutcome::Reclaimed
    );
}

#[test]
fn test_guard_drop_after_drain_is_harmless() {
    let allocator = allocator();
    let ledger = allocator.ledger();

    let guard = allocator.allocate_guard(&ledger, 8, "").unwrap();
    allocator.drain();
    // Release fails with UseAfterReclaim and is only logged
    drop(guard);
    assert_eq!(allocator.stats().rejected_releases, 1);
}
