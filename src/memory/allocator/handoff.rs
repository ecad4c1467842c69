/*!
 * Ownership Hand-off
 *
 * A ledger may only release blocks it holds references to. To pass a block
 * to another caller, the owner detaches its entry into a [`Transfer`] token
 * and the receiver adopts it into its own ledger.
 */

use super::LifetimeAllocator;
use crate::core::types::{AllocatorId, LedgerId, PendingCount};
use crate::memory::ledger::{EntryUpdate, Ledger};
use crate::memory::types::{BlockHandle, MemoryError, MemoryResult};
use tracing::{debug, error, warn};

/// References detached from one ledger, waiting to be adopted by another
#[must_use = "an un-adopted transfer leaves its block registered until drain"]
#[derive(Debug)]
pub struct Transfer {
    handle: BlockHandle,
    count: PendingCount,
    from: LedgerId,
    allocator: AllocatorId,
    settled: bool,
}

impl Transfer {
    pub fn handle(&self) -> BlockHandle {
        self.handle
    }

    /// References carried by this transfer
    pub fn count(&self) -> PendingCount {
        self.count
    }

    /// Ledger the references were detached from
    pub fn from(&self) -> LedgerId {
        self.from
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                block = self.handle.id(),
                from = self.from,
                count = self.count,
                "Transfer dropped without adoption; block stays registered until drain"
            );
        }
    }
}

impl LifetimeAllocator {
    /// Detach all of `from`'s references to `handle`
    pub fn transfer(&self, from: &Ledger, handle: BlockHandle) -> MemoryResult<Transfer> {
        self.check_ledger(from)?;
        self.check_handle(&handle)?;

        let update = from.cell().lock().detach(handle.id());
        match update {
            EntryUpdate::Updated(count) => {
                debug!(block = handle.id(), from = from.id(), count, "Block detached for transfer");
                Ok(Transfer {
                    handle,
                    count,
                    from: from.id(),
                    allocator: self.id,
                    settled: false,
                })
            }
            EntryUpdate::Stale => Err(self.reject(MemoryError::UseAfterReclaim {
                block: handle.id(),
            })),
            EntryUpdate::Missing => Err(self.reject(self.missing_entry(from, &handle))),
        }
    }

    /// Merge a transfer's references into `to`
    pub fn adopt(&self, to: &Ledger, mut transfer: Transfer) -> MemoryResult<BlockHandle> {
        self.check_ledger(to)?;
        let handle = transfer.handle;
        if transfer.allocator != self.id {
            return Err(self.reject(MemoryError::UnknownBlock { block: handle.id() }));
        }

        let _global = self.global.lock();
        // Nothing left to adopt once the block has been drained
        transfer.settled = true;
        if !self.regions.get(handle.class()).contains(handle.id()) {
            return Err(self.reject(MemoryError::UseAfterReclaim { block: handle.id() }));
        }
        if !to.cell().lock().insert(handle.id(), transfer.count) {
            // Detaching removed the only entry; a second one means broken bookkeeping
            error!(block = handle.id(), to = to.id(), "Adopting ledger already holds the block");
            return Err(self.reject(MemoryError::UnknownBlock { block: handle.id() }));
        }
        let count = transfer.count;
        debug!(
            block = handle.id(),
            from = transfer.from,
            to = to.id(),
            count,
            "Block adopted"
        );
        Ok(handle)
    }
}
