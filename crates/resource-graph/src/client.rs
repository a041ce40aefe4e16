//! # State Client
//!
//! This module defines the client for communicating with the state actor.

use crate::error::GraphError;
use crate::message::{ResourceRecord, StateRequest, StateSnapshot};
use tokio::sync::{mpsc, oneshot};

/// ## StateClient
///
/// The `StateClient` provides an async API over a running
/// [`StateActor`](crate::actor::StateActor). It forwards requests over a Tokio mpsc
/// channel and receives results via oneshot channels. It holds only a sender, so
/// cloning it is cheap.
#[derive(Clone, Debug)]
pub struct StateClient {
    sender: mpsc::Sender<StateRequest>,
}

impl StateClient {
    pub fn new(sender: mpsc::Sender<StateRequest>) -> Self {
        Self { sender }
    }

    pub async fn record(&self, record: ResourceRecord) -> Result<(), GraphError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StateRequest::Record { record, respond_to })
            .await
            .map_err(|_| GraphError::StoreClosed)?;
        response.await.map_err(|_| GraphError::StoreDropped)?
    }

    pub async fn get(&self, name: impl Into<String>) -> Result<Option<ResourceRecord>, GraphError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StateRequest::Get {
                name: name.into(),
                respond_to,
            })
            .await
            .map_err(|_| GraphError::StoreClosed)?;
        response.await.map_err(|_| GraphError::StoreDropped)?
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot, GraphError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StateRequest::Snapshot { respond_to })
            .await
            .map_err(|_| GraphError::StoreClosed)?;
        response.await.map_err(|_| GraphError::StoreDropped)?
    }
}
