/*!
 * Raw Memory Providers
 *
 * The allocation layer never manages address space itself. A provider hands
 * out raw addresses and takes them back; everything else (classification,
 * regions, ledgers) sits on top.
 */

mod simulated;
mod system;

pub use simulated::{ProviderStats, SimulatedProvider};
pub use system::SystemProvider;

use crate::core::types::{Address, Size};
use thiserror::Error;

/// Provider failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("exhausted: requested {requested} bytes, {available} bytes available")]
    Exhausted { requested: Size, available: Size },

    #[error("invalid layout for {size} bytes")]
    InvalidLayout { size: Size },
}

/// Raw memory primitive consumed by the allocator
pub trait RawProvider: Send + Sync {
    /// Acquire `size` bytes
    fn acquire(&self, size: Size) -> Result<Address, ProviderError>;

    /// Return an address previously produced by [`RawProvider::acquire`] with the same size
    ///
    /// The allocator calls this exactly once per acquired address.
    fn release(&self, address: Address, size: Size);

    /// Provider name for logs
    fn name(&self) -> &'static str {
        "custom"
    }
}
