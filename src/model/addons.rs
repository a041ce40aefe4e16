use super::literal;
use crate::config::StackConfig;
use crate::error::StackError;
use resource_graph::{Deferred, Input, Resource};
use serde::Serialize;
use serde_json::Value;

pub const REGISTRY_TYPE: &str = "azure-native:containerregistry:Registry";
pub const VAULT_TYPE: &str = "azure-native:keyvault:Vault";
pub const KUBERNETES_PROVIDER_TYPE: &str = "pulumi:providers:kubernetes";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sku {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    pub name: String,
}

/// Container registry in the cluster's resource group.
#[derive(Debug, Clone)]
pub struct RegistryArgs {
    pub registry_name: String,
    pub location: String,
    pub resource_group_name: Deferred<Value>,
    pub sku: Sku,
    pub admin_user_enabled: bool,
}

impl RegistryArgs {
    pub fn from_config(config: &StackConfig, resource_group_name: Deferred<Value>) -> Self {
        Self {
            registry_name: config.registry_name.clone(),
            location: config.location.clone(),
            resource_group_name,
            sku: Sku {
                family: None,
                name: "Basic".to_string(),
            },
            admin_user_enabled: true,
        }
    }

    pub fn into_resource(self, name: &str) -> Result<Resource, StackError> {
        Ok(Resource::new(name, REGISTRY_TYPE)
            .input("registryName", literal(&self.registry_name)?)
            .input("location", literal(&self.location)?)
            .input("resourceGroupName", self.resource_group_name)
            .input("sku", literal(&self.sku)?)
            .input("adminUserEnabled", self.admin_user_enabled))
    }
}

/// Key vault with an empty access policy list.
#[derive(Debug, Clone)]
pub struct VaultArgs {
    pub vault_name: String,
    pub location: String,
    pub tenant_id: String,
    pub resource_group_name: Deferred<Value>,
    pub sku: Sku,
}

impl VaultArgs {
    pub fn from_config(config: &StackConfig, resource_group_name: Deferred<Value>) -> Self {
        Self {
            vault_name: config.vault_name.clone(),
            location: config.location.clone(),
            tenant_id: config.tenant_id.clone(),
            resource_group_name,
            sku: Sku {
                family: Some("A".to_string()),
                name: "standard".to_string(),
            },
        }
    }

    pub fn into_resource(self, name: &str) -> Result<Resource, StackError> {
        let properties = Input::object([
            ("tenantId", literal(&self.tenant_id)?),
            ("sku", literal(&self.sku)?),
            ("accessPolicies", Input::list(Vec::<Input>::new())),
        ]);
        Ok(Resource::new(name, VAULT_TYPE)
            .input("vaultName", literal(&self.vault_name)?)
            .input("location", literal(&self.location)?)
            .input("resourceGroupName", self.resource_group_name)
            .input("properties", properties))
    }
}

/// Kubernetes provider that applies manifests with the cluster's credentials.
pub fn kubernetes_provider(name: &str, kubeconfig: Deferred<Value>) -> Resource {
    Resource::new(name, KUBERNETES_PROVIDER_TYPE).input("kubeconfig", kubeconfig)
}
