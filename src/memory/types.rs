/*!
 * Memory Types
 * Common types for lifetime-classified allocation
 */

use crate::core::types::{Address, AllocatorId, BlockId, LedgerId, PendingCount, Size};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Predicted lifetime bucket of an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifetimeClass {
    Short,
    Medium,
    Long,
}

impl LifetimeClass {
    /// Number of lifetime classes
    pub const COUNT: usize = 3;

    /// Every class, in index order
    pub const ALL: [LifetimeClass; Self::COUNT] =
        [LifetimeClass::Short, LifetimeClass::Medium, LifetimeClass::Long];

    /// Stable index of this class (0, 1, 2)
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            LifetimeClass::Short => 0,
            LifetimeClass::Medium => 1,
            LifetimeClass::Long => 2,
        }
    }

    /// Class for an index, wrapping modulo the class count
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::COUNT]
    }
}

impl std::fmt::Display for LifetimeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LifetimeClass::Short => write!(f, "SHORT"),
            LifetimeClass::Medium => write!(f, "MEDIUM"),
            LifetimeClass::Long => write!(f, "LONG"),
        }
    }
}

impl std::str::FromStr for LifetimeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" | "0" => Ok(LifetimeClass::Short),
            "medium" | "1" => Ok(LifetimeClass::Medium),
            "long" | "2" => Ok(LifetimeClass::Long),
            other => Err(format!("unknown lifetime class '{}'", other)),
        }
    }
}

/// Handle to a live block
///
/// Handles are only minted by the allocator. They are `Copy` so that a stale
/// copy can be presented again; the allocator detects that and reports
/// [`MemoryError::UseAfterReclaim`] instead of releasing twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockHandle {
    id: BlockId,
    address: Address,
    size: Size,
    class: LifetimeClass,
    allocator: AllocatorId,
}

impl BlockHandle {
    pub(crate) fn new(
        id: BlockId,
        address: Address,
        size: Size,
        class: LifetimeClass,
        allocator: AllocatorId,
    ) -> Self {
        Self {
            id,
            address,
            size,
            class,
            allocator,
        }
    }

    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    #[inline]
    pub fn class(&self) -> LifetimeClass {
        self.class
    }

    #[inline]
    pub(crate) fn allocator(&self) -> AllocatorId {
        self.allocator
    }
}

/// Memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum MemoryError {
    #[error("Out of memory: requested {requested} bytes for {class} region ({reason})")]
    #[diagnostic(
        code(memory::out_of_memory),
        help("The raw provider could not satisfy the request. Retrying is a caller policy.")
    )]
    OutOfMemory {
        requested: Size,
        class: LifetimeClass,
        reason: String,
    },

    #[error("Unknown block {block}")]
    #[diagnostic(
        code(memory::unknown_block),
        help("The handle was not issued by this allocator.")
    )]
    UnknownBlock { block: BlockId },

    #[error("Block {block} has already been reclaimed")]
    #[diagnostic(
        code(memory::use_after_reclaim),
        help("The block's pending count already reached zero. Each reference may be released once.")
    )]
    UseAfterReclaim { block: BlockId },

    #[error("Ledger {ledger} holds no reference to live block {block}")]
    #[diagnostic(
        code(memory::cross_thread_release),
        help("Release from the owning ledger, or move ownership with transfer/adopt first.")
    )]
    CrossThreadRelease { block: BlockId, ledger: LedgerId },

    #[error("Ledger {ledger} belongs to a different allocator")]
    #[diagnostic(
        code(memory::foreign_ledger),
        help("Create ledgers with the allocator that will serve them.")
    )]
    ForeignLedger { ledger: LedgerId },

    #[error("Allocator has been drained")]
    #[diagnostic(
        code(memory::closed),
        help("No allocation is accepted after drain().")
    )]
    Closed,
}

/// Result of a successful release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// References remain; nothing left the ledger
    Deferred { remaining: PendingCount },
    /// Count reached zero; queued for the next batched reclamation
    Retired,
    /// Removed from its region and returned to the provider
    Reclaimed,
}

/// Per-region occupancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStats {
    pub class: LifetimeClass,
    pub live_blocks: usize,
    pub live_bytes: Size,
}

/// Allocator statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub regions: Vec<RegionStats>,
    pub allocations: u64,
    pub failed_allocations: u64,
    pub releases: u64,
    pub deferred_releases: u64,
    pub reclaimed_blocks: u64,
    pub rejected_releases: u64,
    pub sync_passes: u64,
    pub purged_entries: u64,
    pub ledgers: usize,
    /// Ledger entries at or below zero
    pub stale_entries: usize,
}

impl AllocatorStats {
    pub fn live_blocks(&self) -> usize {
        self.regions.iter().map(|r| r.live_blocks).sum()
    }

    pub fn live_bytes(&self) -> Size {
        self.regions.iter().map(|r| r.live_bytes).sum()
    }

    /// Stale ledger entries as a percentage of live blocks
    pub fn stale_ratio(&self) -> f64 {
        let live = self.live_blocks();
        if live == 0 {
            0.0
        } else {
            (self.stale_entries as f64 / live as f64) * 100.0
        }
    }
}

/// Outcome of a synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub ledgers_scanned: usize,
    pub entries_purged: usize,
    pub ledgers_pruned: usize,
}

/// Outcome of draining the allocator
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    /// Blocks that were still live and got force-reclaimed
    pub reclaimed: Vec<BlockHandle>,
    pub reclaimed_bytes: Size,
    pub ledgers_cleared: usize,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.reclaimed.is_empty()
    }

    pub fn reclaimed_in(&self, class: LifetimeClass) -> usize {
        self.reclaimed.iter().filter(|h| h.class() == class).count()
    }
}
