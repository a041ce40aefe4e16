//! # Stack Configuration
//!
//! Settings are read from a TOML file named by `CLUSTER_STACK_CONFIG`; every key is
//! optional and falls back to the defaults below. `CLUSTER_STACK_CLUSTER_NAME`
//! overrides the cluster name after the file is read.
//!
//! ```toml
//! managed_cluster_name = "aks-staging"
//! node_count = 5
//! state_file = "state.json"
//!
//! [engine]
//! max-in-flight = 2
//! failure-policy = "halt-on-failure"
//! ```

use crate::error::StackError;
use resource_graph::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "CLUSTER_STACK_CONFIG";
pub const CLUSTER_NAME_ENV: &str = "CLUSTER_STACK_CLUSTER_NAME";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub stack_name: String,
    /// Existing resource group the cluster is placed in. Looked up, never created.
    pub resource_group: String,
    pub managed_cluster_name: String,
    pub location: String,
    pub kubernetes_version: String,
    pub node_count: u32,
    pub vm_size: String,
    pub admin_username: String,
    pub registry_name: String,
    pub vault_name: String,
    pub tenant_id: String,
    /// Local autoscaler manifest; the embedded one is used when unset.
    pub autoscaler_manifest: Option<PathBuf>,
    /// Where the state snapshot is loaded from and written back to.
    pub state_file: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "dev".to_string(),
            resource_group: "1-9071040f-playground-sandbox".to_string(),
            managed_cluster_name: "azure-native-aks".to_string(),
            location: "westus".to_string(),
            kubernetes_version: "1.22.6".to_string(),
            node_count: 3,
            vm_size: "Standard_DS2_v2".to_string(),
            admin_username: "testuser".to_string(),
            registry_name: "clusterstackregistry".to_string(),
            vault_name: "cluster-stack-vault".to_string(),
            tenant_id: "00000000-0000-0000-0000-000000000000".to_string(),
            autoscaler_manifest: None,
            state_file: None,
            engine: EngineConfig::default(),
        }
    }
}

impl StackConfig {
    pub fn from_toml(text: &str) -> Result<Self, StackError> {
        toml::from_str(text).map_err(|e| StackError::Config(e.to_string()))
    }

    /// Loads the file named by [`CONFIG_ENV`], if any, then applies environment
    /// overrides.
    pub async fn load() -> Result<Self, StackError> {
        let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref(), |key| std::env::var(key).ok()).await
    }

    pub async fn load_from(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StackError> {
        let config = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| StackError::Config(format!("{}: {e}", path.display())))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        Ok(config.with_overrides(lookup))
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(name) = lookup(CLUSTER_NAME_ENV).filter(|name| !name.is_empty()) {
            self.managed_cluster_name = name;
        }
        self
    }

    /// Resource group the platform creates for the cluster's nodes.
    pub fn node_resource_group(&self) -> String {
        format!(
            "MC_azure-native-go_{}_{}",
            self.managed_cluster_name, self.location
        )
    }
}
