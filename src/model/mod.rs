//! Parameter bags for the resources the cluster program declares.
//!
//! Each bag holds the literal settings of one resource and turns them, together
//! with the deferred values it is wired to, into a [`Resource`](resource_graph::Resource).

pub mod addons;
pub mod cluster;

pub use addons::*;
pub use cluster::*;

use crate::error::StackError;
use resource_graph::Input;
use serde::Serialize;

pub(crate) fn literal<T: Serialize>(value: &T) -> Result<Input, StackError> {
    serde_json::to_value(value)
        .map(Input::Literal)
        .map_err(|e| StackError::Serialization(e.to_string()))
}
