/*!
 * System Provider
 * Raw memory from the global Rust allocator
 */

use super::{ProviderError, RawProvider};
use crate::core::limits::SYSTEM_ALIGNMENT;
use crate::core::types::{Address, Size};
use std::alloc::{alloc, dealloc, Layout};
use tracing::error;

/// Backs blocks with the process's global allocator
///
/// Zero-byte requests are served as one byte so every block owns a distinct
/// address.
#[derive(Debug, Clone, Copy)]
pub struct SystemProvider {
    alignment: Size,
}

impl SystemProvider {
    pub fn new() -> Self {
        Self {
            alignment: SYSTEM_ALIGNMENT,
        }
    }

    /// Provider with a custom alignment (must be a power of two)
    pub fn with_alignment(alignment: Size) -> Self {
        Self { alignment }
    }

    fn layout(&self, size: Size) -> Result<Layout, ProviderError> {
        Layout::from_size_align(size.max(1), self.alignment)
            .map_err(|_| ProviderError::InvalidLayout { size })
    }
}

impl Default for SystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RawProvider for SystemProvider {
    fn acquire(&self, size: Size) -> Result<Address, ProviderError> {
        let layout = self.layout(size)?;
        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(ProviderError::Exhausted {
                requested: size,
                available: 0,
            });
        }
        Ok(ptr as Address)
    }

    fn release(&self, address: Address, size: Size) {
        match self.layout(size) {
            // SAFETY: the allocator only returns addresses this provider produced
            // for the same size, exactly once
            Ok(layout) => unsafe { dealloc(address as *mut u8, layout) },
            Err(e) => error!(address, size, error = %e, "Cannot release block with invalid layout"),
        }
    }

    fn name(&self) -> &'static str {
        "system"
    }
}
