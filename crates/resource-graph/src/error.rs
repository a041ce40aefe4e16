//! # Graph Errors
//!
//! This module defines the error types shared by every layer of the graph:
//! deferred values, the ordering engine, hook injection and the state store.
//! Centralizing them keeps failure propagation uniform, a failure cached on one
//! deferred value is handed unchanged to everything composed from it.
//!
//! `GraphError` is `Clone` because a single cached failure is observed by every
//! dependent value and by the final run report.

use std::fmt;

/// Errors that can occur while declaring or materializing a resource graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    // --- Definition errors (reported before any remote call) ---
    #[error("Dependency cycle: {0}")]
    Cycle(CyclePath),
    #[error("Resource declared twice: {0}")]
    DuplicateResource(String),
    #[error("Resource {resource} depends on undeclared resource {dependency}")]
    UnknownDependency {
        resource: String,
        dependency: String,
    },
    #[error("Value used by {consumer} is produced by undeclared resource {producer}")]
    UnknownProducer { consumer: String, producer: String },
    #[error("Hook {hook} made a structural edit to document {index}: {detail}")]
    StructuralEdit {
        hook: String,
        index: usize,
        detail: String,
    },
    #[error("Hook {hook} failed on document {index}: {message}")]
    Hook {
        hook: String,
        index: usize,
        message: String,
    },
    #[error("Artifact {location} could not be loaded: {message}")]
    Artifact { location: String, message: String },

    // --- Runtime failures ---
    #[error("Remote operation for {resource} failed: {message}")]
    Remote { resource: String, message: String },
    #[error("Transformation failed: {message}")]
    Transform { message: String },
    #[error("Resource {resource} has no output field {field}")]
    MissingOutput { resource: String, field: String },
    #[error("Resource {resource} skipped because {upstream} failed")]
    DependencyFailed { resource: String, upstream: String },
    #[error("Resource {0} not started after an earlier failure")]
    Halted(String),
    #[error("Producer {0} finished without reporting a value")]
    Abandoned(String),

    // --- State store plumbing ---
    #[error("State store closed")]
    StoreClosed,
    #[error("State store dropped response channel")]
    StoreDropped,

    #[error("Run failed: {0}")]
    RunFailed(FailureList),
}

impl GraphError {
    /// Builds a transformation failure from anything displayable.
    pub fn transform(message: impl fmt::Display) -> Self {
        GraphError::Transform {
            message: message.to_string(),
        }
    }

    /// True for errors detected while validating the declaration.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            GraphError::Cycle(_)
                | GraphError::DuplicateResource(_)
                | GraphError::UnknownDependency { .. }
                | GraphError::UnknownProducer { .. }
                | GraphError::StructuralEdit { .. }
                | GraphError::Hook { .. }
                | GraphError::Artifact { .. }
        )
    }
}

/// The resources forming a dependency cycle, in edge order.
#[derive(Debug, Clone, PartialEq)]
pub struct CyclePath(pub Vec<String>);

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.0 {
            write!(f, "{name} -> ")?;
        }
        // close the loop
        match self.0.first() {
            Some(first) => write!(f, "{first}"),
            None => Ok(()),
        }
    }
}

/// Every failed resource of a run, with its cause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FailureList(pub Vec<(String, GraphError)>);

impl fmt::Display for FailureList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resource(s) failed", self.0.len())?;
        for (name, cause) in &self.0 {
            write!(f, "; {name}: {cause}")?;
        }
        Ok(())
    }
}

/// Failure reported by a provisioning backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ProvisionError {
    pub message: String,
}

impl ProvisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ProvisionError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
