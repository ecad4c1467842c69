/*!
 * Allocation Path
 */

use super::{Counters, LifetimeAllocator};
use crate::core::types::{PendingCount, Size};
use crate::memory::classifier::CallContext;
use crate::memory::ledger::{EntryUpdate, Ledger};
use crate::memory::types::{BlockHandle, MemoryError, MemoryResult};
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

impl LifetimeAllocator {
    /// Allocate `size` bytes on behalf of `ledger`'s owner
    ///
    /// Provider failure leaves every region and ledger untouched.
    pub fn allocate<'c>(
        &self,
        ledger: &Ledger,
        size: Size,
        context: impl Into<CallContext<'c>>,
    ) -> MemoryResult<BlockHandle> {
        self.check_ledger(ledger)?;
        if self.is_closed() {
            return Err(MemoryError::Closed);
        }

        let context = context.into();
        let class = self.classifier.classify(&context);

        let address = match self.provider.acquire(size) {
            Ok(address) => address,
            Err(e) => {
                Counters::bump(&self.counters.failed_allocations, 1);
                warn!(
                    allocator = self.id,
                    requested = size,
                    class = %class,
                    context = %context,
                    error = %e,
                    "Provider could not satisfy allocation"
                );
                return Err(MemoryError::OutOfMemory {
                    requested: size,
                    class,
                    reason: e.to_string(),
                });
            }
        };

        let id = self.next_block.fetch_add(1, Ordering::SeqCst);
        let handle = BlockHandle::new(id, address, size, class, self.id);

        self.regions.get(class).insert(handle);
        if self.is_closed() {
            // A drain raced this allocation; whoever removes the block frees it
            if let Some(block) = self.regions.get(class).remove(id) {
                self.provider.release(block.address(), block.size());
            }
            debug!(allocator = self.id, block = id, "Allocation raced a drain");
            return Err(MemoryError::Closed);
        }
        ledger.cell().lock().record(id);
        Counters::bump(&self.counters.allocations, 1);

        trace!(
            block = id,
            address,
            size,
            class = %class,
            context = %context,
            ledger = ledger.id(),
            "Allocated block"
        );
        Ok(handle)
    }

    /// Add a reference to a block the ledger already owns
    ///
    /// Repeated references stay local to the ledger; only the final release
    /// reaches the global lock.
    pub fn retain(&self, ledger: &Ledger, handle: &BlockHandle) -> MemoryResult<PendingCount> {
        self.check_ledger(ledger)?;
        self.check_handle(handle)?;
        let update = ledger.cell().lock().increment(handle.id());
        match update {
            EntryUpdate::Updated(count) => {
                trace!(block = handle.id(), count, ledger = ledger.id(), "Retained block");
                Ok(count)
            }
            EntryUpdate::Stale => Err(self.reject(MemoryError::UseAfterReclaim {
                block: handle.id(),
            })),
            EntryUpdate::Missing => Err(self.reject(self.missing_entry(ledger, handle))),
        }
    }
}
