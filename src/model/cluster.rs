use super::literal;
use crate::config::StackConfig;
use crate::error::StackError;
use resource_graph::{Deferred, Input, Resource};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const PRIVATE_KEY_TYPE: &str = "tls:index:PrivateKey";
pub const MANAGED_CLUSTER_TYPE: &str = "azure-native:containerservice:ManagedCluster";

/// A generated SSH key pair for the cluster nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyArgs {
    pub algorithm: String,
    pub rsa_bits: u32,
}

impl Default for SshKeyArgs {
    fn default() -> Self {
        Self {
            algorithm: "RSA".to_string(),
            rsa_bits: 4096,
        }
    }
}

impl SshKeyArgs {
    pub fn into_resource(self, name: &str) -> Result<Resource, StackError> {
        Ok(Resource::new(name, PRIVATE_KEY_TYPE)
            .input("algorithm", literal(&self.algorithm)?)
            .input("rsaBits", literal(&self.rsa_bits)?))
    }
}

/// The single system node pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    pub count: u32,
    pub max_pods: u32,
    pub mode: String,
    pub name: String,
    pub node_labels: BTreeMap<String, String>,
    #[serde(rename = "osDiskSizeGB")]
    pub os_disk_size_gb: u32,
    pub os_type: String,
    #[serde(rename = "type")]
    pub pool_type: String,
    pub vm_size: String,
}

impl AgentPoolProfile {
    pub fn system(count: u32, vm_size: impl Into<String>) -> Self {
        Self {
            count,
            max_pods: 110,
            mode: "System".to_string(),
            name: "agentpool".to_string(),
            node_labels: BTreeMap::new(),
            os_disk_size_gb: 30,
            os_type: "Linux".to_string(),
            pool_type: "VirtualMachineScaleSets".to_string(),
            vm_size: vm_size.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AadProfile {
    pub enable_azure_rbac: bool,
    pub managed: bool,
}

/// Parameters of the managed cluster.
///
/// Two inputs are deferred: the looked-up resource group name (also used as DNS
/// prefix) and the public half of the generated SSH key, which ends up nested in
/// the linux profile.
#[derive(Debug, Clone)]
pub struct ManagedClusterArgs {
    pub cluster_name: String,
    pub location: String,
    pub resource_group_name: Deferred<Value>,
    pub public_key: Deferred<Value>,
    pub kubernetes_version: String,
    pub admin_username: String,
    pub agent_pool: AgentPoolProfile,
    pub aad_profile: AadProfile,
    pub node_resource_group: String,
}

impl ManagedClusterArgs {
    pub fn from_config(
        config: &StackConfig,
        resource_group_name: Deferred<Value>,
        public_key: Deferred<Value>,
    ) -> Self {
        Self {
            cluster_name: config.managed_cluster_name.clone(),
            location: config.location.clone(),
            resource_group_name,
            public_key,
            kubernetes_version: config.kubernetes_version.clone(),
            admin_username: config.admin_username.clone(),
            agent_pool: AgentPoolProfile::system(config.node_count, config.vm_size.clone()),
            aad_profile: AadProfile {
                enable_azure_rbac: false,
                managed: true,
            },
            node_resource_group: config.node_resource_group(),
        }
    }

    pub fn into_resource(self, name: &str) -> Result<Resource, StackError> {
        let linux_profile = Input::object([
            ("adminUsername", literal(&self.admin_username)?),
            (
                "ssh",
                Input::object([(
                    "publicKeys",
                    Input::list([Input::object([("keyData", self.public_key)])]),
                )]),
            ),
        ]);

        Ok(Resource::new(name, MANAGED_CLUSTER_TYPE)
            .input("resourceName", literal(&self.cluster_name)?)
            .input("location", literal(&self.location)?)
            .input("resourceGroupName", self.resource_group_name.clone())
            .input("dnsPrefix", self.resource_group_name)
            .input("aadProfile", literal(&self.aad_profile)?)
            .input("agentPoolProfiles", literal(&[&self.agent_pool])?)
            .input("enableRBAC", true)
            .input("identity", Input::object([("type", "SystemAssigned")]))
            .input("kubernetesVersion", literal(&self.kubernetes_version)?)
            .input("linuxProfile", linux_profile)
            .input("nodeResourceGroup", literal(&self.node_resource_group)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_cluster_depends_on_key_through_nested_input() {
        let (public_key, _key) = Deferred::pending("ssh-key");
        let args = ManagedClusterArgs::from_config(
            &StackConfig::default(),
            Deferred::ready(Value::from("rg")),
            public_key,
        );
        let resource = args.into_resource("managedCluster").unwrap();

        assert_eq!(resource.producers(), BTreeSet::from(["ssh-key".to_string()]));
        assert!(matches!(
            &resource.inputs["nodeResourceGroup"],
            Input::Literal(value) if value == "MC_azure-native-go_azure-native-aks_westus"
        ));
    }
}
