//! # Cluster Stack
//!
//! Declares a managed Kubernetes cluster, a container registry, a key vault and an
//! autoscaling add-on as a [`resource_graph`] stack, and wires a Kubernetes provider
//! to the cluster's generated credentials.
//!
//! ## Module Tour
//!
//! - **[`model`]**: parameter bags for each resource, turned into
//!   [`Resource`](resource_graph::Resource)s.
//! - **[`clients`]**: [`SimulatedCloud`](clients::SimulatedCloud), a local backend
//!   implementing [`Provisioner`](resource_graph::Provisioner).
//! - **[`lifecycle`]**: declares the program and runs it with the state store.
//! - **[`config`]**: TOML configuration with defaults and env overrides.
//!
//! The binary entry point is in `main.rs`.

pub mod clients;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;

pub use config::StackConfig;
pub use error::StackError;
