/*!
 * Memory Regions
 *
 * One region per lifetime class. Each region keys its live blocks by block
 * id, so registration and removal are constant time, and guards them with a
 * lock scoped to that region only.
 */

use super::types::{BlockHandle, LifetimeClass, RegionStats};
use crate::core::types::{BlockId, Size};
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Live-block set of one lifetime class
#[derive(Debug)]
pub struct Region {
    class: LifetimeClass,
    blocks: Mutex<HashMap<BlockId, BlockHandle, RandomState>>,
}

impl Region {
    fn new(class: LifetimeClass, capacity: usize) -> Self {
        Self {
            class,
            blocks: Mutex::new(HashMap::with_capacity_and_hasher(
                capacity,
                RandomState::new(),
            )),
        }
    }

    pub fn class(&self) -> LifetimeClass {
        self.class
    }

    pub(crate) fn insert(&self, handle: BlockHandle) {
        debug_assert_eq!(handle.class(), self.class);
        self.blocks.lock().insert(handle.id(), handle);
    }

    pub(crate) fn remove(&self, id: BlockId) -> Option<BlockHandle> {
        self.blocks.lock().remove(&id)
    }

    /// Remove every block, leaving the region empty
    pub(crate) fn take_all(&self) -> Vec<BlockHandle> {
        self.blocks.lock().drain().map(|(_, handle)| handle).collect()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the live handles, in no particular order
    pub fn snapshot(&self) -> Vec<BlockHandle> {
        self.blocks.lock().values().copied().collect()
    }

    pub fn stats(&self) -> RegionStats {
        let blocks = self.blocks.lock();
        RegionStats {
            class: self.class,
            live_blocks: blocks.len(),
            live_bytes: blocks.values().map(|h| h.size()).sum::<Size>(),
        }
    }
}

/// Region per lifetime class, indexed by [`LifetimeClass::index`]
#[derive(Debug)]
pub struct RegionTable {
    regions: [Region; LifetimeClass::COUNT],
}

impl RegionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            regions: LifetimeClass::ALL.map(|class| Region::new(class, capacity)),
        }
    }

    #[inline]
    pub fn get(&self, class: LifetimeClass) -> &Region {
        &self.regions[class.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Every region holding the block; a consistent table yields at most one
    pub fn locate(&self, id: BlockId) -> Vec<LifetimeClass> {
        self.regions
            .iter()
            .filter(|region| region.contains(id))
            .map(Region::class)
            .collect()
    }

    pub fn total_live(&self) -> usize {
        self.regions.iter().map(Region::len).sum()
    }

    pub fn stats(&self) -> Vec<RegionStats> {
        self.regions.iter().map(Region::stats).collect()
    }
}
