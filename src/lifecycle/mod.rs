//! # Program Lifecycle
//!
//! Wires the cluster program together: declaring the stack, starting the state
//! store, running the engine and persisting what it recorded.
//!
//! ## Run Sequence
//!
//! 1. **Declare** - [`ClusterProgram::declare`] builds the [`Stack`](resource_graph::Stack).
//!    The autoscaler manifest is fetched and its hooks applied here, so a bad
//!    manifest stops the run before anything remote happens.
//! 2. **Start state** - [`StateStore`] spawns the state actor, seeded from the
//!    state file when one is configured.
//! 3. **Materialize** - the engine reconciles every resource against the store.
//! 4. **Shut down** - the engine drops its client, the store hands back a final
//!    snapshot and the actor task is awaited; the snapshot is written back.
//!
//! ```bash
//! RUST_LOG=info cargo run
//! CLUSTER_STACK_CONFIG=stack.toml RUST_LOG=debug cargo run
//! ```

pub mod program;
pub mod state;

pub use program::*;
pub use state::*;
