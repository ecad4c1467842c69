/*!
 * Classifier Strategies
 * Hash, fixed and table-driven lifetime prediction
 */

use super::{CallContext, LifetimeClassifier};
use crate::core::limits::{CLASSIFIER_SEEDS, DEFAULT_LIFETIME_CLASS};
use crate::memory::types::LifetimeClass;
use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::BuildHasher;

/// Deterministic hash of the context, bucketed by class count
///
/// Seeds are fixed, so two instances built by the same binary agree on
/// every context.
#[derive(Debug, Clone)]
pub struct HashClassifier {
    state: RandomState,
    default_class: LifetimeClass,
}

impl HashClassifier {
    pub fn new() -> Self {
        Self::with_default(DEFAULT_LIFETIME_CLASS)
    }

    pub fn with_default(default_class: LifetimeClass) -> Self {
        let [k0, k1, k2, k3] = CLASSIFIER_SEEDS;
        Self {
            state: RandomState::with_seeds(k0, k1, k2, k3),
            default_class,
        }
    }
}

impl Default for HashClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LifetimeClassifier for HashClassifier {
    #[inline]
    fn classify(&self, context: &CallContext<'_>) -> LifetimeClass {
        if context.is_empty() {
            return self.default_class;
        }
        let hash = BuildHasher::hash_one(&self.state, context.as_str());
        LifetimeClass::from_index((hash % LifetimeClass::COUNT as u64) as usize)
    }

    fn default_class(&self) -> LifetimeClass {
        self.default_class
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}

/// Assigns every allocation to one class
#[derive(Debug, Clone, Copy)]
pub struct FixedClassifier(pub LifetimeClass);

impl LifetimeClassifier for FixedClassifier {
    #[inline]
    fn classify(&self, _context: &CallContext<'_>) -> LifetimeClass {
        self.0
    }

    fn default_class(&self) -> LifetimeClass {
        self.0
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Explicit context → class table, e.g. exported from an offline model
///
/// JSON form:
/// ```json
/// { "default": "medium", "rules": { "parser::token": "short" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableClassifier {
    #[serde(default = "default_table_class")]
    default: LifetimeClass,
    #[serde(default)]
    rules: HashMap<String, LifetimeClass, RandomState>,
}

fn default_table_class() -> LifetimeClass {
    DEFAULT_LIFETIME_CLASS
}

impl TableClassifier {
    pub fn new(default: LifetimeClass) -> Self {
        Self {
            default,
            rules: HashMap::default(),
        }
    }

    pub fn with_rule(mut self, context: impl Into<String>, class: LifetimeClass) -> Self {
        self.rules.insert(context.into(), class);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl LifetimeClassifier for TableClassifier {
    #[inline]
    fn classify(&self, context: &CallContext<'_>) -> LifetimeClass {
        self.rules
            .get(context.as_str())
            .copied()
            .unwrap_or(self.default)
    }

    fn default_class(&self) -> LifetimeClass {
        self.default
    }

    fn name(&self) -> &'static str {
        "table"
    }
}
