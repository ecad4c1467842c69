/*!
 * Shard Configuration
 *
 * CPU-topology-aware shard counts for the concurrent maps behind the
 * providers. Computed once, then read without synchronization.
 */

use std::sync::OnceLock;
use tracing::{info, warn};

static SHARD_MANAGER: OnceLock<ShardManager> = OnceLock::new();

/// Hardware-aware shard count calculator
#[derive(Debug, Clone)]
pub struct ShardManager {
    cpu_count: usize,
}

impl ShardManager {
    fn instance() -> &'static Self {
        SHARD_MANAGER.get_or_init(|| {
            let cpu_count = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or_else(|_| {
                    warn!("Failed to detect CPU count, defaulting to 8");
                    8
                });

            info!(cpu_count, "ShardManager initialized");
            Self { cpu_count }
        })
    }

    /// Shard count for a given workload profile
    pub fn shards(profile: WorkloadProfile) -> usize {
        let base = Self::instance().cpu_count;

        let multiplier = match profile {
            // Live address maps touched on every acquire/release
            WorkloadProfile::HighContention => 4,
            // Lookups off the hot path
            WorkloadProfile::LowContention => 1,
        };

        // Power of 2 keeps shard selection a bitwise AND
        (base * multiplier).next_power_of_two().clamp(8, 512)
    }

    /// CPU count detected at initialization
    pub fn cpu_count() -> usize {
        Self::instance().cpu_count
    }
}

/// Workload characterization for shard count calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadProfile {
    /// Shard count: 4x CPU cores
    HighContention,
    /// Shard count: 1x CPU cores
    LowContention,
}
