/*!
 * Memory Module
 * Lifetime-classified allocation, deferred reference counting and reclamation
 */

pub mod allocator;
pub mod classifier;
pub mod config;
pub mod guard;
pub mod ledger;
pub mod provider;
pub mod region;
pub mod synchronizer;
pub mod types;

// Re-export for convenience
pub use allocator::{AllocatorBuilder, LifetimeAllocator, Transfer};
pub use classifier::{CallContext, FixedClassifier, HashClassifier, LifetimeClassifier, TableClassifier};
pub use config::{AllocatorConfig, ConfigError, ReclaimPolicy};
pub use guard::{BlockGuard, BlockGuardExt};
pub use ledger::Ledger;
pub use provider::{ProviderError, ProviderStats, RawProvider, SimulatedProvider, SystemProvider};
pub use region::{Region, RegionTable};
pub use synchronizer::SyncDaemon;
pub use types::*;
