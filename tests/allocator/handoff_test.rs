/*!
 * Ownership Hand-off Tests
 */

use lifetime_alloc::memory::{
    FixedClassifier, LifetimeAllocator, LifetimeClass, MemoryError, ReleaseOutcome,
    SimulatedProvider,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;

fn allocator() -> LifetimeAllocator {
    LifetimeAllocator::new(FixedClassifier(LifetimeClass::Medium), SimulatedProvider::new())
}

#[test]
fn test_transfer_moves_all_references() {
    let allocator = allocator();
    let producer = allocator.ledger();
    let consumer = allocator.ledger();

    let handle = allocator.allocate(&producer, 256, "message").unwrap();
    allocator.retain(&producer, &handle).unwrap();

    let transfer = allocator.transfer(&producer, handle).unwrap();
    assert_eq!(transfer.count(), 2);
    assert_eq!(transfer.from(), producer.id());
    assert_eq!(transfer.handle(), handle);
    assert_eq!(producer.pending(&handle), None);

    let adopted = allocator.adopt(&consumer, transfer).unwrap();
    assert_eq!(adopted, handle);
    assert_eq!(consumer.pending(&handle), Some(2));

    // The producer no longer owns it
    assert_eq!(
        allocator.release(&producer, handle),
        Err(MemoryError::CrossThreadRelease {
            block: handle.id(),
            ledger: producer.id()
        })
    );

    assert_eq!(
        allocator.release(&consumer, handle).unwrap(),
        ReleaseOutcome::Deferred { remaining: 1 }
    );
    assert_eq!(
        allocator.release(&consumer, handle).unwrap(),
        ReleaseOutcome::Reclaimed
    );
}

#[test]
fn test_transfer_round_trip() {
    let allocator = allocator();
    let a = allocator.ledger();
    let b = allocator.ledger();

    let handle = allocator.allocate(&a, 64, "").unwrap();
    let transfer = allocator.transfer(&a, handle).unwrap();
    allocator.adopt(&b, transfer).unwrap();

    let back = allocator.transfer(&b, handle).unwrap();
    allocator.adopt(&a, back).unwrap();
    assert_eq!(a.pending(&handle), Some(1));
    assert_eq!(b.pending(&handle), None);
    assert_eq!(
        allocator.release(&a, handle).unwrap(),
        ReleaseOutcome::Reclaimed
    );
}

#[test]
fn test_transfer_across_threads() {
    let allocator = Arc::new(allocator());
    let (tx, rx) = flume::unbounded();

    let producer = {
        let allocator = allocator.clone();
        thread::spawn(move || {
            let ledger = allocator.ledger();
            for i in 0..100 {
                let handle = allocator.allocate(&ledger, 16 + i, "queue").unwrap();
                tx.send(allocator.transfer(&ledger, handle).unwrap()).unwrap();
            }
            assert!(ledger.is_empty());
        })
    };

    let consumer = {
        let allocator = allocator.clone();
        thread::spawn(move || {
            let ledger = allocator.ledger();
            let mut reclaimed = 0;
            for transfer in rx.iter() {
                let handle = allocator.adopt(&ledger, transfer).unwrap();
                if allocator.release(&ledger, handle).unwrap() == ReleaseOutcome::Reclaimed {
                    reclaimed += 1;
                }
            }
            reclaimed
        })
    };

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), 100);
    assert_eq!(allocator.regions().total_live(), 0);
}

#[test]
fn test_transfer_errors() {
    let allocator = allocator();
    let owner = allocator.ledger();
    let other = allocator.ledger();

    let handle = allocator.allocate(&owner, 32, "").unwrap();
    assert_eq!(
        allocator.transfer(&other, handle).unwrap_err(),
        MemoryError::CrossThreadRelease {
            block: handle.id(),
            ledger: other.id()
        }
    );

    allocator.release(&owner, handle).unwrap();
    assert_eq!(
        allocator.transfer(&owner, handle).unwrap_err(),
        MemoryError::UseAfterReclaim { block: handle.id() }
    );
}

#[test]
fn test_adopt_after_drain_fails() {
    let allocator = allocator();
    let from = allocator.ledger();
    let to = allocator.ledger();

    let handle = allocator.allocate(&from, 32, "").unwrap();
    let transfer = allocator.transfer(&from, handle).unwrap();
    allocator.drain();

    assert_eq!(
        allocator.adopt(&to, transfer).unwrap_err(),
        MemoryError::UseAfterReclaim { block: handle.id() }
    );
    assert!(to.is_empty());
}

#[test]
fn test_adopt_into_other_allocator_fails() {
    let first = allocator();
    let second = allocator();
    let from = first.ledger();
    let to = second.ledger();

    let handle = first.allocate(&from, 32, "").unwrap();
    let transfer = first.transfer(&from, handle).unwrap();
    assert_eq!(
        second.adopt(&to, transfer).unwrap_err(),
        MemoryError::UnknownBlock { block: handle.id() }
    );
    assert!(first.contains(&handle), "block stays registered until drain");
}
