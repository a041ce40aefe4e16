//! # Resource Graph
//!
//! This crate provides the building blocks for declarative provisioning programs:
//! programs that declare remote resources whose properties are unknown until the
//! resources exist, wire those properties into other resources, and let an engine
//! work out what to create in which order.
//!
//! ## Architecture Overview
//!
//! The crate separates concerns into three layers:
//!
//! 1. **Declaration Layer** ([`Stack`], [`Resource`], [`Deferred`]) - what the program says
//! 2. **Runtime Layer** ([`Engine`]) - ordering, concurrency and failure propagation
//! 3. **Backend Layer** ([`Provisioner`], [`ArtifactSource`], [`StateActor`]) - what
//!    actually talks to the outside world
//!
//! ## Core Abstractions
//!
//! ### [`Deferred`] - Values That Do Not Exist Yet
//!
//! A placeholder for a resource output. Transformations are attached with `map`,
//! `try_map` and `then`; they run once, in order, when the value resolves. Values
//! remember which resources they come from, and that is how the engine learns most
//! dependency edges.
//!
//! ### [`Stack`] - The Declarations
//!
//! Resources, manifests and exports of one program run. [`Stack::plan`] validates
//! the graph (cycles, unknown names) before anything remote happens.
//!
//! ### [`Hook`] - Editing Fetched Manifests
//!
//! Composite artifacts such as multi-document YAML manifests are fetched, edited by
//! hooks and expanded into one resource per document.
//!
//! ## Example
//!
//! ```rust
//! use resource_graph::{Engine, Input, MockProvisioner, Resource, Stack};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockProvisioner::new();
//!     mock.expect_create("cluster").return_ok(json!({ "name": "aks-7f3a" }));
//!
//!     let mut stack = Stack::new("demo");
//!     let cluster = stack.declare(Resource::new("cluster", "ManagedCluster")).unwrap();
//!     // The pool is only created once the cluster's name is known.
//!     stack
//!         .declare(
//!             Resource::new("pool", "AgentPool")
//!                 .input("cluster", Input::from(cluster.output("name"))),
//!         )
//!         .unwrap();
//!
//!     let report = Engine::new(Arc::new(mock.clone())).run(stack).await.unwrap();
//!     assert_eq!(report.started, vec!["cluster", "pool"]);
//!     assert_eq!(mock.requests()[1].inputs, json!({ "cluster": "aks-7f3a" }));
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - One orchestration task polls every in-flight remote call
//! - Independent branches overlap, bounded by [`EngineConfig::max_in_flight`]
//! - Deferred outcomes are cached behind a `OnceCell`, safe to resolve from anywhere
//! - Recorded state lives in an actor and is only touched through messages
//!
//! ## Testing
//!
//! [`MockProvisioner`] scripts remote answers per resource and records the order of
//! calls. See the [`mock`] module.

pub mod actor;
pub mod artifact;
pub mod client;
pub mod config;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod message;
pub mod mock;
pub mod provider;
pub mod report;
pub mod resource;
pub mod stack;
pub mod tracing;

// Re-export core types for convenience
pub use actor::StateActor;
pub use artifact::{ArtifactSource, Document, FileSource, StaticSource};
pub use client::StateClient;
pub use config::{EngineConfig, FailurePolicy};
pub use deferred::{all, zip, Deferred, DeferredState, Producer};
pub use engine::Engine;
pub use error::{GraphError, ProvisionError};
pub use hooks::{Hook, Selector};
pub use message::{ResourceRecord, StateSnapshot};
pub use mock::MockProvisioner;
pub use provider::{invoke, CreateRequest, Provisioner};
pub use report::{ResourceReport, ResourceStatus, RunReport};
pub use resource::{Input, Resource, ResourceRef};
pub use stack::{Manifest, Plan, Stack};
