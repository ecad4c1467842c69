/*!
 * Core Types
 * Common types used across the allocation layer
 */

/// Raw address handed out by a provider
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Stable identity of a block; never reused within one allocator
pub type BlockId = u64;

/// Identity of a reference ledger
pub type LedgerId = u64;

/// Identity of an allocator instance
pub type AllocatorId = u64;

/// Signed pending reference count held in a ledger
pub type PendingCount = i64;
