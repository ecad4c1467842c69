/*!
 * Lifetime Classification
 *
 * Maps an allocation's call context to a predicted lifetime class. The
 * prediction mechanism is a strategy injected into the allocator, so a learned
 * model can replace the hash strategy without touching allocation control flow.
 *
 * Contract for every strategy:
 * - never fails; an empty context maps to the strategy's default class
 * - pure: identical contexts yield identical classes within one instance
 * - O(1) and side-effect free, since it runs on every allocation
 */

mod context;
mod strategies;

pub use context::CallContext;
pub use strategies::{FixedClassifier, HashClassifier, TableClassifier};

use super::types::LifetimeClass;

/// Lifetime prediction strategy
pub trait LifetimeClassifier: Send + Sync {
    /// Predict the lifetime class for a call context
    fn classify(&self, context: &CallContext<'_>) -> LifetimeClass;

    /// Class used for empty or unrecognized contexts
    fn default_class(&self) -> LifetimeClass;

    /// Strategy name for logs
    fn name(&self) -> &'static str {
        "custom"
    }
}
