//! # Engine Configuration

use serde::{Deserialize, Serialize};

/// What the engine does once a resource has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Skip only what depends on the failure; independent branches still finish.
    #[default]
    ContinueIndependent,
    /// Start nothing new after the first failure; let in-flight work settle.
    HaltOnFailure,
}

/// Tunables for [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Upper bound on remote calls in flight at once. Zero is treated as one.
    pub max_in_flight: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            failure_policy: FailurePolicy::ContinueIndependent,
        }
    }
}
