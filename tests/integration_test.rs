use cluster_stack::clients::{SimulatedCloud, GET_RESOURCE_GROUP, LIST_CLUSTER_USER_CREDENTIALS};
use cluster_stack::lifecycle::{deploy, StateStore, AUTOSCALER, KUBERNETES_PROVIDER};
use cluster_stack::{StackConfig, StackError};
use resource_graph::{GraphError, MockProvisioner, ResourceStatus, StateSnapshot};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

const CRD: &str =
    "cluster-autoscaler/CustomResourceDefinition/autoscalingpolicies.autoscaling.clusterstack.io";
const DEPLOYMENT: &str = "cluster-autoscaler/Deployment/kube-system/cluster-autoscaler";

fn position(started: &[String], name: &str) -> usize {
    started
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} was never started"))
}

/// Full end-to-end run against the simulated cloud.
#[tokio::test]
async fn test_full_deployment() {
    let cloud = Arc::new(SimulatedCloud::default());
    let (report, snapshot) = deploy(
        StackConfig::default(),
        cloud,
        StateStore::new(StateSnapshot::default()),
    )
    .await
    .expect("Deployment failed");

    assert!(report.is_success(), "{}", report.failures());
    assert_eq!(report.resources.len(), 9);
    assert_eq!(snapshot.resources.len(), 9);

    // Exports
    let kubeconfig = report.export("kubeconfig").unwrap().as_ref().unwrap();
    let kubeconfig = kubeconfig.as_str().unwrap();
    assert!(kubeconfig.contains("current-context: azure-native-aks"));
    assert!(kubeconfig
        .contains("server: https://1-9071040f-playground-sandbox.hcp.westus.azmk8s.io:443"));
    assert_eq!(
        report.export("registryLoginServer"),
        Some(&Ok(json!("clusterstackregistry.azurecr.io")))
    );
    assert_eq!(
        report.export("vaultUri"),
        Some(&Ok(json!("https://cluster-stack-vault.vault.azure.net/")))
    );

    // The public key ends up nested in the cluster's linux profile.
    let cluster = report.resource("managedCluster").unwrap();
    let inputs = cluster.inputs.as_ref().unwrap();
    let key = report.resource("ssh-key").unwrap().outputs.as_ref().unwrap();
    assert_eq!(
        inputs["linuxProfile"]["ssh"]["publicKeys"][0]["keyData"],
        key["publicKeyOpenssh"]
    );
    assert_eq!(inputs["dnsPrefix"], "1-9071040f-playground-sandbox");
    assert_eq!(
        inputs["nodeResourceGroup"],
        "MC_azure-native-go_azure-native-aks_westus"
    );

    // Ordering: key, cluster, provider, then every manifest document
    let started = &report.started;
    assert!(position(started, "ssh-key") < position(started, "managedCluster"));
    assert!(position(started, "managedCluster") < position(started, KUBERNETES_PROVIDER));
    for document in report.resources.iter().filter(|r| r.name.starts_with(AUTOSCALER)) {
        assert!(position(started, KUBERNETES_PROVIDER) < position(started, &document.name));
    }

    // Only the CRD lost its status.
    let crd = report.resource(CRD).unwrap().inputs.as_ref().unwrap();
    assert!(crd["manifest"].get("status").is_none());
    assert_eq!(crd["manifest"]["spec"]["group"], "autoscaling.clusterstack.io");
    let deployment = report.resource(DEPLOYMENT).unwrap();
    assert_eq!(deployment.type_tag, "kubernetes:apps/v1:Deployment");
}

#[tokio::test]
async fn test_rerun_reconciles_and_recreates_changed_branch() {
    // 1. First run records everything
    let (_, snapshot) = deploy(
        StackConfig::default(),
        Arc::new(SimulatedCloud::default()),
        StateStore::new(StateSnapshot::default()),
    )
    .await
    .unwrap();

    // 2. Same configuration against a fresh backend that only knows the snapshot
    let cloud = SimulatedCloud::default().with_snapshot(&snapshot);
    let (report, snapshot) = deploy(
        StackConfig::default(),
        Arc::new(cloud),
        StateStore::new(snapshot),
    )
    .await
    .unwrap();
    assert!(report
        .resources
        .iter()
        .all(|r| r.status == ResourceStatus::Unchanged));
    assert!(report.is_success(), "{}", report.failures());

    // 3. A bigger node pool re-creates the cluster and everything downstream of it
    let config = StackConfig {
        node_count: 5,
        ..StackConfig::default()
    };
    let cloud = SimulatedCloud::default().with_snapshot(&snapshot);
    let (report, snapshot) = deploy(config, Arc::new(cloud), StateStore::new(snapshot))
        .await
        .unwrap();

    let status = |name: &str| report.resource(name).unwrap().status.clone();
    assert_eq!(status("ssh-key"), ResourceStatus::Unchanged);
    assert_eq!(status("registry"), ResourceStatus::Unchanged);
    assert_eq!(status("vault"), ResourceStatus::Unchanged);
    assert_eq!(status("managedCluster"), ResourceStatus::Created);
    assert_eq!(status(KUBERNETES_PROVIDER), ResourceStatus::Created);
    assert_eq!(status(CRD), ResourceStatus::Created);
    assert_eq!(
        snapshot.resources["managedCluster"].inputs["agentPoolProfiles"][0]["count"],
        5
    );
}

#[tokio::test]
async fn test_credential_failure_spares_independent_resources() {
    let mock = MockProvisioner::new();
    mock.expect_create("ssh-key")
        .return_ok(json!({ "publicKeyOpenssh": "ssh-rsa AAAA test" }));
    mock.expect_invoke(GET_RESOURCE_GROUP)
        .return_ok(json!({ "name": "rg" }));
    mock.expect_invoke(LIST_CLUSTER_USER_CREDENTIALS)
        .return_err("AuthorizationFailed");
    mock.expect_create("registry")
        .return_ok(json!({ "loginServer": "rg.azurecr.io" }));

    let (report, snapshot) = deploy(
        StackConfig::default(),
        Arc::new(mock.clone()),
        StateStore::new(StateSnapshot::default()),
    )
    .await
    .unwrap();

    assert_eq!(
        report.succeeded(),
        vec!["ssh-key", "managedCluster", "registry", "vault"]
    );
    assert_eq!(
        report.resource(KUBERNETES_PROVIDER).unwrap().status,
        ResourceStatus::Failed(GraphError::Remote {
            resource: LIST_CLUSTER_USER_CREDENTIALS.into(),
            message: "AuthorizationFailed".into(),
        })
    );
    assert_eq!(
        report.resource(DEPLOYMENT).unwrap().status,
        ResourceStatus::Skipped(GraphError::DependencyFailed {
            resource: DEPLOYMENT.into(),
            upstream: KUBERNETES_PROVIDER.into(),
        })
    );
    assert!(report.export("kubeconfig").unwrap().is_err());
    assert_eq!(
        report.export("registryLoginServer"),
        Some(&Ok(json!("rg.azurecr.io")))
    );

    // The group lookup is shared by every consumer and runs once.
    let lookups = mock
        .invocations()
        .into_iter()
        .filter(|(function, _)| function == GET_RESOURCE_GROUP)
        .count();
    assert_eq!(lookups, 1);
    assert!(mock.calls().iter().all(|name| !name.starts_with(AUTOSCALER)));
    assert!(!snapshot.resources.contains_key(KUBERNETES_PROVIDER));
    mock.verify();
}

#[tokio::test]
async fn test_missing_manifest_stops_before_remote_calls() {
    let mock = MockProvisioner::new();
    let dir = tempfile::tempdir().unwrap();
    let config = StackConfig {
        autoscaler_manifest: Some(dir.path().join("missing.yaml")),
        ..StackConfig::default()
    };

    let result = deploy(
        config,
        Arc::new(mock.clone()),
        StateStore::new(StateSnapshot::default()),
    )
    .await;

    assert!(matches!(
        result,
        Err(StackError::Graph(GraphError::Artifact { .. }))
    ));
    assert!(mock.calls().is_empty());
    assert!(mock.invocations().is_empty());
}

#[tokio::test]
async fn test_manifest_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "kind: CustomResourceDefinition\n\
         apiVersion: apiextensions.k8s.io/v1\n\
         metadata:\n  name: widgets.example.io\n\
         status:\n  storedVersions: []\n\
         ---\n\
         kind: ConfigMap\n\
         apiVersion: v1\n\
         metadata:\n  name: settings\n  namespace: default\n\
         status: kept\n",
    )
    .unwrap();

    let config = StackConfig {
        autoscaler_manifest: Some(file.path().to_path_buf()),
        ..StackConfig::default()
    };
    let (report, _) = deploy(
        config,
        Arc::new(SimulatedCloud::default()),
        StateStore::new(StateSnapshot::default()),
    )
    .await
    .unwrap();

    assert!(report.is_success(), "{}", report.failures());
    let crd = report
        .resource("cluster-autoscaler/CustomResourceDefinition/widgets.example.io")
        .unwrap();
    assert!(crd.inputs.as_ref().unwrap()["manifest"].get("status").is_none());
    let config_map = report
        .resource("cluster-autoscaler/ConfigMap/default/settings")
        .unwrap();
    assert_eq!(config_map.inputs.as_ref().unwrap()["manifest"]["status"], "kept");
}
