//! # State Store Messages
//!
//! This module defines the records kept by the state store and the messages sent
//! between the [`StateClient`](crate::client::StateClient) and the
//! [`StateActor`](crate::actor::StateActor).

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the state actor.
pub type Response<T> = oneshot::Sender<Result<T, GraphError>>;

/// What was last materialized for one resource: its resolved inputs and the outputs
/// the backend returned for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    pub type_tag: String,
    pub inputs: Value,
    pub outputs: Value,
}

/// Serializable copy of the whole store, used to carry state between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub resources: BTreeMap<String, ResourceRecord>,
}

/// Requests understood by the state actor.
#[derive(Debug)]
pub enum StateRequest {
    Record {
        record: ResourceRecord,
        respond_to: Response<()>,
    },
    Get {
        name: String,
        respond_to: Response<Option<ResourceRecord>>,
    },
    Snapshot {
        respond_to: Response<StateSnapshot>,
    },
}
