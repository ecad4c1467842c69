/*!
 * Property Tests
 * Random single-thread operation sequences checked against a counting model
 */

use lifetime_alloc::memory::{
    BlockHandle, HashClassifier, LifetimeAllocator, LifetimeClass, MemoryError, ReleaseOutcome,
    SimulatedProvider,
};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Allocate { size: usize, site: u8 },
    Retain(usize),
    Release(usize),
    Synchronize,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..512, any::<u8>()).prop_map(|(size, site)| Op::Allocate { size, site }),
        2 => any::<usize>().prop_map(Op::Retain),
        4 => any::<usize>().prop_map(Op::Release),
        1 => Just(Op::Synchronize),
    ]
}

struct Model {
    blocks: Vec<(BlockHandle, i64)>,
}

impl Model {
    fn live(&self) -> impl Iterator<Item = &(BlockHandle, i64)> {
        self.blocks.iter().filter(|(_, count)| *count > 0)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_allocator_matches_counting_model(ops in prop::collection::vec(op(), 1..200)) {
        let provider = Arc::new(SimulatedProvider::new());
        let allocator = LifetimeAllocator::builder()
            .classifier(HashClassifier::new())
            .shared_provider(provider.clone())
            .build()
            .unwrap();
        let ledger = allocator.ledger();
        let mut model = Model { blocks: Vec::new() };

        for op in ops {
            match op {
                Op::Allocate { size, site } => {
                    let handle = allocator.allocate(&ledger, size, format!("site-{}", site)).unwrap();
                    model.blocks.push((handle, 1));
                }
                Op::Retain(pick) if !model.blocks.is_empty() => {
                    let index = pick % model.blocks.len();
                    let (handle, count) = &mut model.blocks[index];
                    let result = allocator.retain(&ledger, handle);
                    if *count > 0 {
                        *count += 1;
                        prop_assert_eq!(result, Ok(*count));
                    } else {
                        prop_assert_eq!(result, Err(MemoryError::UseAfterReclaim { block: handle.id() }));
                    }
                }
                Op::Release(pick) if !model.blocks.is_empty() => {
                    let index = pick % model.blocks.len();
                    let (handle, count) = &mut model.blocks[index];
                    let result = allocator.release(&ledger, *handle);
                    if *count > 1 {
                        *count -= 1;
                        prop_assert_eq!(result, Ok(ReleaseOutcome::Deferred { remaining: *count }));
                    } else if *count == 1 {
                        *count = 0;
                        prop_assert_eq!(result, Ok(ReleaseOutcome::Reclaimed));
                    } else {
                        prop_assert_eq!(result, Err(MemoryError::UseAfterReclaim { block: handle.id() }));
                    }
                }
                Op::Synchronize => {
                    allocator.synchronize();
                }
                _ => {}
            }

            // Every live block sits in exactly its own region
            prop_assert_eq!(allocator.regions().total_live(), model.live().count());
            for (handle, count) in &model.blocks {
                let expected = if *count > 0 { Some(handle.class()) } else { None };
                prop_assert_eq!(allocator.locate(handle), expected);
                prop_assert_eq!(ledger.pending(handle), if *count > 0 { Some(*count) } else { None });
            }
        }

        for class in LifetimeClass::ALL {
            let expected = model.live().filter(|(h, _)| h.class() == class).count();
            prop_assert_eq!(allocator.live_count(class), expected);
        }
        prop_assert_eq!(provider.stats().double_releases, 0);
        prop_assert_eq!(provider.stats().live_addresses, model.live().count());

        let report = allocator.drain();
        prop_assert_eq!(report.reclaimed.len(), model.live().count());
        prop_assert_eq!(provider.stats().live_addresses, 0);
    }
}
