//! # Composite Artifacts
//!
//! An artifact is a fetched, ordered sequence of documents, typically a
//! multi-document YAML manifest. Sources implement [`ArtifactSource`]; the stack
//! applies [`Hook`](crate::hooks::Hook)s to the documents before each becomes a
//! resource (see [`Stack::declare_manifest`](crate::stack::Stack::declare_manifest)).

use crate::error::GraphError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// One sub-document of an artifact.
pub type Document = Value;

/// Fetches an artifact by location.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Vec<Document>, GraphError>;
}

/// Parses multi-document YAML (JSON is a subset) into documents, in order.
/// Empty documents, e.g. after a trailing `---`, are skipped.
pub fn parse_documents(location: &str, text: &str) -> Result<Vec<Document>, GraphError> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document).map_err(|e| GraphError::Artifact {
            location: location.to_string(),
            message: e.to_string(),
        })?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    debug!(location, count = documents.len(), "Parsed artifact");
    Ok(documents)
}

/// Artifacts held in memory, keyed by location.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    artifacts: HashMap<String, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: impl Into<String>, text: impl Into<String>) -> Self {
        self.artifacts.insert(location.into(), text.into());
        self
    }
}

#[async_trait]
impl ArtifactSource for StaticSource {
    async fn fetch(&self, location: &str) -> Result<Vec<Document>, GraphError> {
        let text = self
            .artifacts
            .get(location)
            .ok_or_else(|| GraphError::Artifact {
                location: location.to_string(),
                message: "not found".to_string(),
            })?;
        parse_documents(location, text)
    }
}

/// Artifacts read from the local filesystem, relative to an optional base directory.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    base: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }
}

#[async_trait]
impl ArtifactSource for FileSource {
    async fn fetch(&self, location: &str) -> Result<Vec<Document>, GraphError> {
        let path = match &self.base {
            Some(base) => base.join(location),
            None => PathBuf::from(location),
        };
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| GraphError::Artifact {
                location: location.to_string(),
                message: e.to_string(),
            })?;
        parse_documents(location, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_skips_empty_documents() {
        let text = "kind: Namespace\nmetadata:\n  name: autoscaler\n---\n---\nkind: ConfigMap\n";
        let documents = parse_documents("inline", text).unwrap();
        assert_eq!(
            documents,
            vec![
                json!({ "kind": "Namespace", "metadata": { "name": "autoscaler" } }),
                json!({ "kind": "ConfigMap" }),
            ]
        );
    }

    #[tokio::test]
    async fn test_static_source_missing_location() {
        let source = StaticSource::new().with("a.yaml", "kind: A");
        assert_eq!(source.fetch("a.yaml").await.unwrap().len(), 1);
        assert!(matches!(
            source.fetch("b.yaml").await,
            Err(GraphError::Artifact { .. })
        ));
    }
}
