/*!
 * Simulated Provider
 *
 * Capacity-bounded simulated address space. Freed addresses are recycled for
 * requests of exactly the same size (no splitting, no coalescing). Every
 * release is checked against the live set, so a double release is counted
 * instead of silently corrupting accounting.
 */

use super::{ProviderError, RawProvider};
use crate::core::limits::{DEFAULT_SIMULATED_CAPACITY, SIMULATED_BASE_ADDRESS};
use crate::core::types::{Address, Size};
use crate::core::{ShardManager, WorkloadProfile};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Provider counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub capacity: Size,
    pub used: Size,
    pub live_addresses: usize,
    pub acquired: u64,
    pub released: u64,
    pub recycled: u64,
    pub double_releases: u64,
}

/// Simulated raw provider
pub struct SimulatedProvider {
    capacity: Size,
    used: AtomicUsize,
    next_address: AtomicUsize,
    // Exact-size recycling: size -> freed addresses
    free_list: Mutex<BTreeMap<Size, Vec<Address>>>,
    live: DashMap<Address, Size, RandomState>,
    acquired: AtomicU64,
    released: AtomicU64,
    recycled: AtomicU64,
    double_releases: AtomicU64,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SIMULATED_CAPACITY)
    }

    /// Create a provider with a custom capacity (useful for testing OOM)
    pub fn with_capacity(capacity: Size) -> Self {
        info!(capacity, "Simulated provider initialized");
        Self {
            capacity,
            used: AtomicUsize::new(0),
            next_address: AtomicUsize::new(SIMULATED_BASE_ADDRESS),
            free_list: Mutex::new(BTreeMap::new()),
            live: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                ShardManager::shards(WorkloadProfile::HighContention),
            ),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
            double_releases: AtomicU64::new(0),
        }
    }

    pub fn is_live(&self, address: Address) -> bool {
        self.live.contains_key(&address)
    }

    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            capacity: self.capacity,
            used: self.used.load(Ordering::SeqCst),
            live_addresses: self.live.len(),
            acquired: self.acquired.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
            recycled: self.recycled.load(Ordering::SeqCst),
            double_releases: self.double_releases.load(Ordering::SeqCst),
        }
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RawProvider for SimulatedProvider {
    fn acquire(&self, size: Size) -> Result<Address, ProviderError> {
        // Reserve capacity atomically, revert on overflow
        let used = self.used.fetch_add(size, Ordering::SeqCst);
        if used.saturating_add(size) > self.capacity {
            self.used.fetch_sub(size, Ordering::SeqCst);
            let available = self.capacity.saturating_sub(used);
            warn!(
                requested = size,
                available,
                capacity = self.capacity,
                "Simulated provider exhausted"
            );
            return Err(ProviderError::Exhausted {
                requested: size,
                available,
            });
        }

        let recycled = {
            let mut free_list = self.free_list.lock();
            let address = free_list.get_mut(&size).and_then(|bucket| bucket.pop());
            if free_list.get(&size).map_or(false, |bucket| bucket.is_empty()) {
                free_list.remove(&size);
            }
            address
        };

        let address = match recycled {
            Some(address) => {
                self.recycled.fetch_add(1, Ordering::Relaxed);
                debug!(address, size, "Recycled simulated address");
                address
            }
            // Zero-byte blocks still consume one address so handles stay distinct
            None => self.next_address.fetch_add(size.max(1), Ordering::SeqCst),
        };

        self.live.insert(address, size);
        self.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(address)
    }

    fn release(&self, address: Address, size: Size) {
        match self.live.remove(&address) {
            Some((_, recorded)) => {
                if recorded != size {
                    warn!(
                        address,
                        recorded, size, "Release size differs from acquired size"
                    );
                }
                self.used.fetch_sub(recorded, Ordering::SeqCst);
                self.free_list.lock().entry(recorded).or_default().push(address);
                self.released.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.double_releases.fetch_add(1, Ordering::SeqCst);
                warn!(address, size, "Release of an address that is not live");
            }
        }
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
