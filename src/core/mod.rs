/*!
 * Core Module
 * Fundamental types, limits and shard configuration
 */

pub mod limits;
pub mod shard_manager;
pub mod types;

// Re-export for convenience
pub use shard_manager::{ShardManager, WorkloadProfile};
pub use types::*;
