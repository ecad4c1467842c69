/*!
 * Release and Reclamation
 *
 * Deferred reference counting: a release only touches the caller's ledger
 * until the count reaches zero. Reclamation (region removal plus provider
 * release) happens under the global lock, either right away or, with the
 * batched policy, for a whole queue of retired blocks at once.
 *
 * Region removal is the single gate to the provider: a block goes back to the
 * provider only if this call removed it from its region.
 *
 * Every global-lock hold taken here also empties the orphan queue.
 */

use super::{Counters, LifetimeAllocator};
use crate::memory::config::ReclaimPolicy;
use crate::memory::ledger::{EntryUpdate, Ledger, LedgerRegistry};
use crate::core::types::BlockId;
use crate::memory::types::{BlockHandle, MemoryError, MemoryResult, ReleaseOutcome};
use tracing::{debug, trace, warn};

impl LifetimeAllocator {
    /// Drop one of `ledger`'s references to `handle`
    pub fn release(&self, ledger: &Ledger, handle: BlockHandle) -> MemoryResult<ReleaseOutcome> {
        self.check_ledger(ledger)?;
        self.check_handle(&handle)?;

        // Ledger lock is released before the global lock is taken
        let update = ledger.cell().lock().decrement(handle.id());
        let remaining = match update {
            EntryUpdate::Updated(remaining) => remaining,
            EntryUpdate::Stale => {
                return Err(self.reject(MemoryError::UseAfterReclaim {
                    block: handle.id(),
                }))
            }
            EntryUpdate::Missing => return Err(self.reject(self.missing_entry(ledger, &handle))),
        };
        Counters::bump(&self.counters.releases, 1);

        if remaining > 0 {
            Counters::bump(&self.counters.deferred_releases, 1);
            trace!(block = handle.id(), remaining, ledger = ledger.id(), "Release deferred");
            return Ok(ReleaseOutcome::Deferred { remaining });
        }

        match self.config.reclaim {
            ReclaimPolicy::Immediate => {
                self.reclaim(ledger, &handle)?;
                Ok(ReleaseOutcome::Reclaimed)
            }
            ReclaimPolicy::Batched { batch_size } => {
                let queued = ledger.cell().lock().retire(handle);
                trace!(block = handle.id(), queued, ledger = ledger.id(), "Block retired");
                if queued < batch_size {
                    return Ok(ReleaseOutcome::Retired);
                }
                if self.flush_retired(ledger).contains(&handle.id()) {
                    Ok(ReleaseOutcome::Reclaimed)
                } else {
                    // Drained between retirement and the flush
                    Err(self.reject(MemoryError::UseAfterReclaim {
                        block: handle.id(),
                    }))
                }
            }
        }
    }

    /// Reclaim every block `ledger` has queued, under one global-lock hold
    ///
    /// Returns the number of blocks handed back to the provider, orphans of
    /// dropped ledgers included.
    pub fn flush(&self, ledger: &Ledger) -> MemoryResult<usize> {
        self.check_ledger(ledger)?;
        let flushed = self.flush_retired(ledger).len();
        let orphans = self.reclaim_orphans(&self.global.lock());
        Ok(flushed + orphans)
    }

    /// Flush a ledger and stop tracking it
    ///
    /// Positive entries it still holds stay registered until drain.
    pub fn close_ledger(&self, ledger: Ledger) -> MemoryResult<usize> {
        self.check_ledger(&ledger)?;
        let flushed = self.flush_retired(&ledger).len();
        self.global.lock().deregister(ledger.id());
        debug!(allocator = self.id, ledger = ledger.id(), flushed, "Ledger closed");
        Ok(flushed)
    }

    fn reclaim(&self, ledger: &Ledger, handle: &BlockHandle) -> MemoryResult<()> {
        let global = self.global.lock();
        let removed = self.regions.get(handle.class()).remove(handle.id());
        ledger.cell().lock().remove_stale(handle.id());
        self.reclaim_orphans(&global);

        match removed {
            Some(block) => {
                self.provider.release(block.address(), block.size());
                Counters::bump(&self.counters.reclaimed, 1);
                trace!(
                    block = block.id(),
                    address = block.address(),
                    class = %block.class(),
                    "Reclaimed block"
                );
                Ok(())
            }
            None => {
                // Only a concurrent drain removes blocks behind a ledger's back
                warn!(block = handle.id(), "Block missing from its region at reclamation");
                Err(self.reject(MemoryError::UseAfterReclaim {
                    block: handle.id(),
                }))
            }
        }
    }

    /// Reclaim `ledger`'s queue; returns the ids actually reclaimed
    fn flush_retired(&self, ledger: &Ledger) -> Vec<BlockId> {
        let retired = ledger.cell().lock().take_retired();
        if retired.is_empty() {
            return Vec::new();
        }

        let global = self.global.lock();
        let mut state = ledger.cell().lock();
        let mut reclaimed = Vec::with_capacity(retired.len());
        for handle in &retired {
            state.remove_stale(handle.id());
            if self.return_to_provider(handle) {
                reclaimed.push(handle.id());
            } else {
                warn!(block = handle.id(), "Retired block missing from its region");
            }
        }
        drop(state);
        self.reclaim_orphans(&global);
        drop(global);

        Counters::bump(&self.counters.reclaimed, reclaimed.len() as u64);
        debug!(
            ledger = ledger.id(),
            queued = retired.len(),
            reclaimed = reclaimed.len(),
            "Flushed retired blocks"
        );
        reclaimed
    }

    /// Reclaim blocks left queued by dropped ledgers
    ///
    /// Takes the registry guard to prove the global lock is held.
    pub(super) fn reclaim_orphans(&self, _global: &LedgerRegistry) -> usize {
        let orphans = std::mem::take(&mut *self.orphans.lock());
        if orphans.is_empty() {
            return 0;
        }

        let reclaimed = orphans
            .iter()
            .filter(|handle| self.return_to_provider(handle))
            .count();
        Counters::bump(&self.counters.reclaimed, reclaimed as u64);
        debug!(
            allocator = self.id,
            orphans = orphans.len(),
            reclaimed,
            "Reclaimed orphaned blocks"
        );
        reclaimed
    }

    /// Remove from the region and, only if that succeeded, release to the provider
    fn return_to_provider(&self, handle: &BlockHandle) -> bool {
        match self.regions.get(handle.class()).remove(handle.id()) {
            Some(block) => {
                self.provider.release(block.address(), block.size());
                true
            }
            None => false,
        }
    }
}
