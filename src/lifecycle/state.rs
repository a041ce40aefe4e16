use crate::error::StackError;
use resource_graph::{StateActor, StateClient, StateSnapshot};
use std::path::Path;
use tokio::task::JoinHandle;
use tracing::{error, info};

const STATE_BUFFER: usize = 32;

/// A running state actor plus the handle needed to stop it.
///
/// # Example
///
/// ```ignore
/// let store = StateStore::new(read_snapshot(path).await?);
/// let report = engine.with_state(store.client()).run(stack).await?;
/// let snapshot = store.shutdown().await?;
/// write_snapshot(path, &snapshot).await?;
/// ```
pub struct StateStore {
    client: StateClient,
    handle: JoinHandle<()>,
}

impl StateStore {
    /// Spawns the actor, seeded with an earlier snapshot.
    pub fn new(snapshot: StateSnapshot) -> Self {
        let (actor, client) = StateActor::from_snapshot(STATE_BUFFER, snapshot);
        let handle = tokio::spawn(actor.run());
        Self { client, handle }
    }

    pub fn client(&self) -> StateClient {
        self.client.clone()
    }

    /// Takes a final snapshot, closes the channel and waits for the actor.
    ///
    /// Every other clone of the client must be dropped first, or this waits forever.
    pub async fn shutdown(self) -> Result<StateSnapshot, StackError> {
        let snapshot = self.client.snapshot().await?;
        drop(self.client);

        if let Err(e) = self.handle.await {
            error!("State actor failed: {:?}", e);
            return Err(StackError::State(format!("State actor failed: {:?}", e)));
        }
        Ok(snapshot)
    }
}

/// Reads a state file. A missing file means an empty snapshot.
pub async fn read_snapshot(path: &Path) -> Result<StateSnapshot, StackError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str(&text)
            .map_err(|e| StackError::State(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No state file, starting empty");
            Ok(StateSnapshot::default())
        }
        Err(e) => Err(StackError::State(format!("{}: {e}", path.display()))),
    }
}

pub async fn write_snapshot(path: &Path, snapshot: &StateSnapshot) -> Result<(), StackError> {
    let text =
        serde_json::to_string_pretty(snapshot).map_err(|e| StackError::State(e.to_string()))?;
    tokio::fs::write(path, text)
        .await
        .map_err(|e| StackError::State(format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), resources = snapshot.resources.len(), "State saved");
    Ok(())
}
