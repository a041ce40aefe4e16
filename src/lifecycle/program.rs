use crate::clients::{GET_RESOURCE_GROUP, LIST_CLUSTER_USER_CREDENTIALS};
use crate::config::StackConfig;
use crate::error::StackError;
use crate::lifecycle::state::StateStore;
use crate::model::{
    kubernetes_provider, ManagedClusterArgs, RegistryArgs, SshKeyArgs, VaultArgs,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use resource_graph::{
    invoke, ArtifactSource, Deferred, Engine, FileSource, GraphError, Hook, Input, Manifest,
    Provisioner, RunReport, Stack, StateSnapshot, StaticSource,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

pub const SSH_KEY: &str = "ssh-key";
pub const MANAGED_CLUSTER: &str = "managedCluster";
pub const REGISTRY: &str = "registry";
pub const VAULT: &str = "vault";
pub const KUBERNETES_PROVIDER: &str = "k8s-provider";
pub const AUTOSCALER: &str = "cluster-autoscaler";

/// Location of the autoscaler manifest shipped with the binary.
pub const EMBEDDED_AUTOSCALER: &str = "embedded:cluster-autoscaler.yaml";
const AUTOSCALER_MANIFEST: &str = include_str!("cluster-autoscaler.yaml");

/// Declares the managed cluster and everything wired to its outputs.
///
/// ```text
/// getResourceGroup ─┬─> managedCluster ─> listCredentials ─> k8s-provider ─> cluster-autoscaler/*
/// ssh-key ──────────┘
/// getResourceGroup ─┬─> registry
///                   └─> vault
/// ```
pub struct ClusterProgram {
    config: StackConfig,
    provisioner: Arc<dyn Provisioner>,
}

impl ClusterProgram {
    pub fn new(config: StackConfig, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            config,
            provisioner,
        }
    }

    /// Where the autoscaler manifest is read from: the configured file, or the
    /// embedded copy.
    pub fn autoscaler_source(&self) -> (Box<dyn ArtifactSource>, String) {
        match &self.config.autoscaler_manifest {
            Some(path) => (
                Box::new(FileSource::new()),
                path.to_string_lossy().into_owned(),
            ),
            None => (
                Box::new(StaticSource::new().with(EMBEDDED_AUTOSCALER, AUTOSCALER_MANIFEST)),
                EMBEDDED_AUTOSCALER.to_string(),
            ),
        }
    }

    #[instrument(skip_all, fields(stack = %self.config.stack_name))]
    pub async fn declare(
        &self,
        artifacts: &dyn ArtifactSource,
        autoscaler_location: &str,
    ) -> Result<Stack, StackError> {
        let config = &self.config;
        let mut stack = Stack::new(config.stack_name.clone());

        // 1. The resource group already exists; it is looked up, not created.
        let group = invoke(
            self.provisioner.clone(),
            GET_RESOURCE_GROUP,
            Input::object([("resourceGroupName", config.resource_group.as_str())]),
        );
        let group_name = field(&group, GET_RESOURCE_GROUP, "name");

        // 2. Cluster, with the generated public key nested in its linux profile
        let key = stack.declare(SshKeyArgs::default().into_resource(SSH_KEY)?)?;
        let cluster = ManagedClusterArgs::from_config(
            config,
            group_name.clone(),
            key.output("publicKeyOpenssh"),
        );
        let cluster = stack.declare(cluster.into_resource(MANAGED_CLUSTER)?)?;

        // 3. Credentials are only listed once the cluster's name is known.
        let credentials = invoke(
            self.provisioner.clone(),
            LIST_CLUSTER_USER_CREDENTIALS,
            Input::object([
                ("resourceGroupName", group_name.clone()),
                ("resourceName", cluster.output("name")),
            ]),
        );
        let kubeconfig = credentials
            .try_map(|credentials| first_kubeconfig(&credentials))
            .try_map(|encoded| decode_kubeconfig(&encoded))
            .map(Value::from);
        stack.export("kubeconfig", kubeconfig.clone());

        // 4. Registry and vault only need the resource group.
        let registry = RegistryArgs::from_config(config, group_name.clone());
        let registry = stack.declare(registry.into_resource(REGISTRY)?)?;
        stack.export("registryLoginServer", registry.output("loginServer"));

        let vault = VaultArgs::from_config(config, group_name);
        let vault = stack.declare(vault.into_resource(VAULT)?)?;
        stack.export("vaultUri", field(&vault.output("properties"), VAULT, "vaultUri"));

        // 5. Autoscaler applied through a provider built from the decoded kubeconfig
        let provider = stack.declare(kubernetes_provider(KUBERNETES_PROVIDER, kubeconfig))?;
        let manifest = Manifest::new(AUTOSCALER, autoscaler_location)
            .hook(
                Hook::remove_field("strip-crd-status", "status")
                    .for_kind("CustomResourceDefinition"),
            )
            .input("provider", provider.output("id"));
        stack.declare_manifest(artifacts, manifest).await?;

        info!(resources = stack.len(), "Stack declared");
        Ok(stack)
    }
}

/// Declares the program and materializes it, reconciling against `store`.
///
/// The store is shut down before returning and its final snapshot handed back,
/// also when the run itself failed.
pub async fn deploy(
    config: StackConfig,
    provisioner: Arc<dyn Provisioner>,
    store: StateStore,
) -> Result<(RunReport, StateSnapshot), StackError> {
    let engine_config = config.engine.clone();
    let program = ClusterProgram::new(config, provisioner.clone());

    let (artifacts, location) = program.autoscaler_source();
    let report = match program.declare(artifacts.as_ref(), &location).await {
        Ok(stack) => Engine::new(provisioner)
            .with_config(engine_config)
            .with_state(store.client())
            .run(stack)
            .await
            .map_err(StackError::from),
        Err(e) => Err(e),
    };

    let snapshot = store.shutdown().await?;
    Ok((report?, snapshot))
}

fn field(value: &Deferred<Value>, source: &str, name: &str) -> Deferred<Value> {
    let resource = source.to_string();
    let name = name.to_string();
    value.try_map(move |value| {
        value
            .get(&name)
            .cloned()
            .ok_or(GraphError::MissingOutput {
                resource,
                field: name,
            })
    })
}

fn first_kubeconfig(credentials: &Value) -> Result<String, GraphError> {
    credentials["kubeconfigs"][0]["value"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| GraphError::transform("credentials contain no kubeconfig"))
}

/// Base64, then UTF-8.
pub fn decode_kubeconfig(encoded: &str) -> Result<String, GraphError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| GraphError::transform(format!("kubeconfig is not base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| GraphError::transform(format!("kubeconfig is not UTF-8: {e}")))
}
