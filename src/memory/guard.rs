/*!
 * Block Guards
 *
 * RAII wrapper that releases its reference when dropped
 */

use super::allocator::LifetimeAllocator;
use super::classifier::CallContext;
use super::ledger::Ledger;
use super::types::{BlockHandle, LifetimeClass, MemoryResult, ReleaseOutcome};
use crate::core::types::{Address, Size};
use tracing::warn;

/// One reference to a block, released on drop
#[derive(Debug)]
pub struct BlockGuard<'a> {
    allocator: &'a LifetimeAllocator,
    ledger: &'a Ledger,
    handle: BlockHandle,
    armed: bool,
}

impl<'a> BlockGuard<'a> {
    pub fn handle(&self) -> BlockHandle {
        self.handle
    }

    pub fn address(&self) -> Address {
        self.handle.address()
    }

    pub fn size(&self) -> Size {
        self.handle.size()
    }

    pub fn class(&self) -> LifetimeClass {
        self.handle.class()
    }

    /// Take another reference, returned as its own guard
    pub fn share(&self) -> MemoryResult<BlockGuard<'a>> {
        self.allocator.retain(self.ledger, &self.handle)?;
        Ok(BlockGuard {
            allocator: self.allocator,
            ledger: self.ledger,
            handle: self.handle,
            armed: true,
        })
    }

    /// Release now and observe the outcome
    pub fn release(mut self) -> MemoryResult<ReleaseOutcome> {
        self.armed = false;
        self.allocator.release(self.ledger, self.handle)
    }

    /// Give up the guard without releasing; the caller owns the reference
    pub fn into_handle(mut self) -> BlockHandle {
        self.armed = false;
        self.handle
    }
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.allocator.release(self.ledger, self.handle) {
                warn!(block = self.handle.id(), error = %e, "Guard release failed");
            }
        }
    }
}

/// Extension trait for guarded allocation
pub trait BlockGuardExt {
    /// Allocate a block whose reference is released when the guard drops
    ///
    /// # Example
    ///
    /// ```rust
    /// use lifetime_alloc::memory::{BlockGuardExt, LifetimeAllocator};
    ///
    /// let allocator = LifetimeAllocator::with_defaults();
    /// let ledger = allocator.ledger();
    /// {
    ///     let guard = allocator.allocate_guard(&ledger, 256, "scratch")?;
    ///     assert!(allocator.contains(&guard.handle()));
    /// }
    /// assert_eq!(allocator.stats().live_blocks(), 0);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn allocate_guard<'a, 'c>(
        &'a self,
        ledger: &'a Ledger,
        size: Size,
        context: impl Into<CallContext<'c>>,
    ) -> MemoryResult<BlockGuard<'a>>;
}

impl BlockGuardExt for LifetimeAllocator {
    fn allocate_guard<'a, 'c>(
        &'a self,
        ledger: &'a Ledger,
        size: Size,
        context: impl Into<CallContext<'c>>,
    ) -> MemoryResult<BlockGuard<'a>> {
        let handle = self.allocate(ledger, size, context)?;
        Ok(BlockGuard {
            allocator: self,
            ledger,
            handle,
            armed: true,
        })
    }
}
