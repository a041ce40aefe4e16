//! Backends the cluster program can be materialized against.

pub mod simulated;

pub use simulated::*;
