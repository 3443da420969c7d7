//! Engine configuration parameters
//!
//! Tunables for the RCI engine. Hosts may load them from JSON; every field
//! has a default so partial documents are accepted.

use serde::{Deserialize, Serialize};

use crate::rci::list::MAX_LIST_DEPTH;
use crate::rci::lock::MAX_LOCKS;

/// What to do when schema, handlers and caller disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantPolicy {
    /// Abort the process.
    Panic,
    /// Log at error level and skip the offending transition.
    LogAndIgnore,
}

impl Default for InvariantPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::LogAndIgnore
        }
    }
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub invariant_policy: InvariantPolicy,
    /// Global cap on list nesting, applied on top of each group's own limit.
    pub max_list_depth: usize,
    /// Locks held at once across all sessions.
    pub lock_capacity: usize,
    /// Storage namespace built-in handlers persist their records under.
    pub storage_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            invariant_policy: InvariantPolicy::default(),
            max_list_depth: MAX_LIST_DEPTH,
            lock_capacity: MAX_LOCKS,
            storage_namespace: "rci".into(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(1..=MAX_LIST_DEPTH).contains(&self.max_list_depth) {
            return Err("max_list_depth must be 1..=8");
        }
        if !(1..=MAX_LOCKS).contains(&self.lock_capacity) {
            return Err("lock_capacity must be 1..=16");
        }
        // NVS namespace names are limited to 15 bytes.
        if self.storage_namespace.is_empty() || self.storage_namespace.len() > 15 {
            return Err("storage_namespace must be 1-15 bytes");
        }
        Ok(())
    }
}
