//! # Observability & Tracing
//!
//! The [`setup_tracing`] function initializes structured logging with the `tracing`
//! crate. Log levels are controlled with `RUST_LOG`.
//!
//! ## What Gets Traced
//!
//! - **Planning**: resource count once the graph is validated
//! - **Materialization**: input resolution (`debug`), create/unchanged/created (`info`)
//! - **Failures**: remote and transformation failures, skips and halts (`warn`)
//! - **State store**: startup, shutdown, record/get (`debug`)
//!
//! ```bash
//! RUST_LOG=info cargo run                       # one line per resource
//! RUST_LOG=debug cargo run                      # inputs, invokes, hooks
//! RUST_LOG=resource_graph=debug cargo run       # engine only
//! ```
//!
//! With `RUST_LOG=info` a run looks like:
//!
//! ```text
//! INFO run: Plan computed stack="aks" resources=9
//! INFO run: Creating resource="ssh-key" type_tag="tls:PrivateKey"
//! INFO run: Created resource="ssh-key"
//! INFO run: Creating resource="managed-cluster" type_tag="containerservice:ManagedCluster"
//! INFO run: Run finished succeeded=9 failed=0
//! ```

/// Installs the global subscriber: env-filtered, compact, without module targets.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
