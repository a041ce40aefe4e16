//! # Provisioner Trait
//!
//! The `Provisioner` trait is the contract between the graph and whatever actually
//! talks to the cloud. The engine never knows what a "cluster" or a "vault" is: it
//! hands the backend a type tag and a fully resolved input object, and gets back an
//! output object (or a [`ProvisionError`]).
//!
//! Two operations exist:
//! - [`Provisioner::create`] materializes a declared resource.
//! - [`Provisioner::invoke`] runs a read-only data-source function (looking up an
//!   existing resource group, listing cluster credentials). Invokes are not
//!   resources; they are exposed to programs as deferred values through [`invoke`].

use crate::deferred::Deferred;
use crate::error::{GraphError, ProvisionError};
use crate::resource::Input;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// A create call, with every deferred input already resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRequest {
    pub name: String,
    pub type_tag: String,
    pub inputs: Value,
}

/// Backend that performs remote operations on behalf of the engine.
///
/// # Async & Sharing
/// The engine holds the provisioner as `Arc<dyn Provisioner>` and may have several
/// calls in flight at once, one per independent branch of the graph.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates (or updates) the resource and returns its outputs.
    async fn create(&self, request: CreateRequest) -> Result<Value, ProvisionError>;

    /// Runs a read-only data-source function.
    async fn invoke(&self, function: &str, _args: Value) -> Result<Value, ProvisionError> {
        Err(ProvisionError::new(format!(
            "function {function} is not supported by this provisioner"
        )))
    }
}

/// Exposes a data-source call as a deferred value.
///
/// The call depends on every producer referenced by `args` and runs, at most once,
/// when the value is first resolved.
pub fn invoke(
    provisioner: Arc<dyn Provisioner>,
    function: impl Into<String>,
    args: impl Into<Input>,
) -> Deferred<Value> {
    let function = function.into();
    let args = args.into();
    let mut producers = BTreeSet::new();
    args.collect_producers(&mut producers);

    let source = async move {
        let args = args.resolve().await?;
        debug!(%function, "Invoke");
        provisioner
            .invoke(&function, args)
            .await
            .map_err(|e| GraphError::Remote {
                resource: function.clone(),
                message: e.message,
            })
    };
    Deferred::from_parts(producers, source.boxed())
}
