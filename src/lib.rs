/*!
 * Lifetime Allocator Library
 *
 * Lifetime-class-aware allocation layer: classifies each request by predicted
 * lifetime, routes blocks to per-class regions, and reclaims them through
 * deferred per-caller reference counting with periodic synchronization.
 */

pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use crate::core::types::{Address, BlockId, LedgerId, PendingCount, Size};
pub use memory::{
    AllocatorBuilder, AllocatorConfig, AllocatorStats, BlockGuard, BlockGuardExt, BlockHandle,
    CallContext, ConfigError, DrainReport, FixedClassifier, HashClassifier, Ledger,
    LifetimeAllocator, LifetimeClass, LifetimeClassifier, MemoryError, MemoryResult,
    ProviderError, RawProvider, ReclaimPolicy, ReleaseOutcome, SimulatedProvider, SyncDaemon,
    SyncReport, SystemProvider, TableClassifier, Transfer,
};
pub use monitoring::init_tracing;
