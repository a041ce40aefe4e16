//! # Run Report
//!
//! The outcome of one engine run: one [`ResourceReport`] per declared resource (in
//! declaration order), the order in which remote calls were actually started, and
//! the exported values. A failed run still reports every independent branch that
//! succeeded, with its outputs.

use crate::error::{FailureList, GraphError};
use serde_json::Value;
use std::collections::BTreeMap;

/// Final state of one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceStatus {
    /// The backend created (or updated) the resource during this run.
    Created,
    /// Recorded state matched the resolved inputs; no remote call was made.
    Unchanged,
    /// Input resolution or the remote call failed.
    Failed(GraphError),
    /// Never started, because a dependency failed or the run was halted.
    Skipped(GraphError),
}

impl ResourceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ResourceStatus::Created | ResourceStatus::Unchanged)
    }

    pub fn error(&self) -> Option<&GraphError> {
        match self {
            ResourceStatus::Failed(error) | ResourceStatus::Skipped(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReport {
    pub name: String,
    pub type_tag: String,
    pub status: ResourceStatus,
    /// The resolved input set, when resolution succeeded. External diffing works
    /// from this.
    pub inputs: Option<Value>,
    pub outputs: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub stack: String,
    /// Topological order computed before the run.
    pub plan: Vec<String>,
    /// Resources in the order their materialization started.
    pub started: Vec<String>,
    pub resources: Vec<ResourceReport>,
    pub exports: BTreeMap<String, Result<Value, GraphError>>,
}

impl RunReport {
    pub fn resource(&self, name: &str) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn export(&self, name: &str) -> Option<&Result<Value, GraphError>> {
        self.exports.get(name)
    }

    /// Names of the resources that ended in a successful state.
    pub fn succeeded(&self) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| r.status.is_success())
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Every failed or skipped resource and every failed export, with its cause.
    pub fn failures(&self) -> FailureList {
        let resources = self.resources.iter().filter_map(|r| {
            r.status
                .error()
                .map(|error| (r.name.clone(), error.clone()))
        });
        let exports = self.exports.iter().filter_map(|(name, outcome)| {
            outcome
                .as_ref()
                .err()
                .map(|error| (format!("export {name}"), error.clone()))
        });
        FailureList(resources.chain(exports).collect())
    }

    /// True when every resource materialized and every export resolved.
    pub fn is_success(&self) -> bool {
        self.failures().0.is_empty()
    }

    /// Turns a failed run into [`GraphError::RunFailed`].
    pub fn ensure_success(&self) -> Result<(), GraphError> {
        let failures = self.failures();
        if failures.0.is_empty() {
            Ok(())
        } else {
            Err(GraphError::RunFailed(failures))
        }
    }
}
