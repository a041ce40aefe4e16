//! # Transformation Hooks
//!
//! A [`Hook`] edits the documents of a fetched artifact before they are turned into
//! resources, e.g. stripping the `status` block that some published manifests carry
//! on their CustomResourceDefinitions:
//!
//! ```rust
//! use resource_graph::hooks::{apply_hooks, Hook};
//! use serde_json::json;
//!
//! let strip_status = Hook::remove_field("strip-crd-status", "status")
//!     .for_kind("CustomResourceDefinition");
//! let documents = vec![
//!     json!({ "kind": "CustomResourceDefinition", "status": "X" }),
//!     json!({ "kind": "Deployment", "status": "Y" }),
//! ];
//! let documents = apply_hooks(documents, &[strip_status]).unwrap();
//! assert_eq!(documents[0], json!({ "kind": "CustomResourceDefinition" }));
//! assert_eq!(documents[1], json!({ "kind": "Deployment", "status": "Y" }));
//! ```
//!
//! ## Rules
//!
//! - For each document, in document order, every hook runs in declaration order.
//!   A hook whose selector does not match the document skips it.
//! - Hooks may rewrite or delete fields. They may not remove a document, split it or
//!   turn it into anything but a mapping: such edits fail with
//!   [`GraphError::StructuralEdit`].
//! - Any failure fails the whole artifact; no partial set of documents is returned.

use crate::artifact::Document;
use crate::error::GraphError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type EditFn = dyn Fn(&mut Document) -> Result<(), String> + Send + Sync;
type MatchFn = dyn Fn(&Document) -> bool + Send + Sync;

/// Which documents a hook applies to.
#[derive(Clone, Default)]
pub enum Selector {
    #[default]
    All,
    Kind(String),
    Custom(Arc<MatchFn>),
}

impl Selector {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Selector::All => true,
            Selector::Kind(kind) => {
                document.get("kind").and_then(Value::as_str) == Some(kind.as_str())
            }
            Selector::Custom(matcher) => matcher(document),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, "All"),
            Selector::Kind(kind) => write!(f, "Kind({kind})"),
            Selector::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// A named document edit plus the documents it applies to.
#[derive(Clone)]
pub struct Hook {
    name: String,
    selector: Selector,
    edit: Arc<EditFn>,
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("selector", &self.selector)
            .finish()
    }
}

impl Hook {
    pub fn new<F>(name: impl Into<String>, edit: F) -> Self
    where
        F: Fn(&mut Document) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            selector: Selector::All,
            edit: Arc::new(edit),
        }
    }

    /// Deletes a top-level field wherever it is present.
    pub fn remove_field(name: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(name, move |document| {
            if let Some(object) = document.as_object_mut() {
                object.remove(&field);
            }
            Ok(())
        })
    }

    pub fn only(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn for_kind(self, kind: impl Into<String>) -> Self {
        self.only(Selector::Kind(kind.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, index: usize, document: &mut Document) -> Result<(), GraphError> {
        if !self.selector.matches(document) {
            return Ok(());
        }
        (self.edit)(document).map_err(|message| GraphError::Hook {
            hook: self.name.clone(),
            index,
            message,
        })?;

        let detail = match document {
            Value::Object(_) => return Ok(()),
            Value::Null => "document removed".to_string(),
            Value::Array(items) => format!("document split into {} documents", items.len()),
            _ => "document is no longer a mapping".to_string(),
        };
        Err(GraphError::StructuralEdit {
            hook: self.name.clone(),
            index,
            detail,
        })
    }
}

/// Applies every hook to every document. Count and order of documents are kept.
pub fn apply_hooks(
    mut documents: Vec<Document>,
    hooks: &[Hook],
) -> Result<Vec<Document>, GraphError> {
    for (index, document) in documents.iter_mut().enumerate() {
        for hook in hooks {
            hook.apply(index, document)?;
        }
    }
    debug!(documents = documents.len(), hooks = hooks.len(), "Hooks applied");
    Ok(documents)
}
