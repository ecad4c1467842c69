/*!
 * System Limits and Constants
 *
 * Centralized location for defaults and thresholds used by the allocator.
 * - Performance-critical constants are marked with [PERF]
 */

use crate::memory::LifetimeClass;

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Class assigned to an empty or missing call context
pub const DEFAULT_LIFETIME_CLASS: LifetimeClass = LifetimeClass::Short;

/// Fixed hasher seeds for the hash classifier
/// Identical contexts must land in the same class across classifier instances
pub const CLASSIFIER_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

// =============================================================================
// RECLAMATION
// =============================================================================

/// Retired blocks queued per ledger before a batched reclamation pass
/// [PERF] One global-lock acquisition per batch instead of per block
pub const DEFAULT_RECLAIM_BATCH: usize = 64;

/// Background synchronizer period (1 second)
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 1_000;

/// Initial capacity of each region's live-block map
pub const DEFAULT_REGION_CAPACITY: usize = 256;

// =============================================================================
// SIMULATED PROVIDER
// =============================================================================

/// Capacity of the simulated address space (64MB)
pub const DEFAULT_SIMULATED_CAPACITY: usize = 64 * 1024 * 1024;

/// First address handed out by the simulated provider
/// Keeps zero out of the address space so a null address is never valid
pub const SIMULATED_BASE_ADDRESS: usize = 0x1000;

/// Alignment used by the system provider
pub const SYSTEM_ALIGNMENT: usize = 16;
