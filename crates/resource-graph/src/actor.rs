//! # State Store Actor
//!
//! This module defines the `StateActor`, which owns the record of what was last
//! materialized for every resource. The engine consults it to decide whether a
//! resource can be reused, and reports every successful create back to it.
//!
//! The actor processes messages sequentially, so the record map needs no lock even
//! when several branches of the graph finish at the same time.

use crate::client::StateClient;
use crate::message::{ResourceRecord, StateRequest, StateSnapshot};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The actor that owns the recorded state.
///
/// # Usage Pattern
///
/// 1.  **Create**: Call `StateActor::new()` (or `from_snapshot`) to get the actor and
///     its client.
/// 2.  **Run**: Spawn the actor's run loop in a background task.
/// 3.  **Use**: Hand the client to the engine; ask it for a snapshot after the run.
///
/// ```rust
/// use resource_graph::actor::StateActor;
///
/// #[tokio::main]
/// async fn main() {
///     let (actor, client) = StateActor::new(16);
///     tokio::spawn(actor.run());
///
///     let snapshot = client.snapshot().await.unwrap();
///     assert!(snapshot.resources.is_empty());
/// }
/// ```
pub struct StateActor {
    receiver: mpsc::Receiver<StateRequest>,
    store: BTreeMap<String, ResourceRecord>,
}

impl StateActor {
    /// Creates an empty store and its client.
    ///
    /// # Arguments
    ///
    /// * `buffer_size` - The capacity of the MPSC channel. If the channel is full,
    ///   calls to the client wait until there is space.
    pub fn new(buffer_size: usize) -> (Self, StateClient) {
        Self::from_snapshot(buffer_size, StateSnapshot::default())
    }

    /// Creates a store pre-loaded with the records of an earlier run.
    pub fn from_snapshot(buffer_size: usize, snapshot: StateSnapshot) -> (Self, StateClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: snapshot.resources,
        };
        (actor, StateClient::new(sender))
    }

    /// Runs the actor's event loop until every client is dropped.
    pub async fn run(mut self) {
        info!(size = self.store.len(), "State store started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StateRequest::Record { record, respond_to } => {
                    debug!(resource = %record.name, "Record");
                    self.store.insert(record.name.clone(), record);
                    let _ = respond_to.send(Ok(()));
                }
                StateRequest::Get { name, respond_to } => {
                    let record = self.store.get(&name).cloned();
                    debug!(resource = %name, found = record.is_some(), "Get");
                    let _ = respond_to.send(Ok(record));
                }
                StateRequest::Snapshot { respond_to } => {
                    let _ = respond_to.send(Ok(StateSnapshot {
                        resources: self.store.clone(),
                    }));
                }
            }
        }

        info!(size = self.store.len(), "State store shutdown");
    }
}
