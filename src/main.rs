use cluster_stack::clients::SimulatedCloud;
use cluster_stack::lifecycle::{deploy, read_snapshot, write_snapshot, StateStore};
use cluster_stack::StackConfig;
use resource_graph::tracing::setup_tracing;
use resource_graph::{ResourceStatus, StateSnapshot};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let config = StackConfig::load().await.map_err(|e| e.to_string())?;
    info!(
        stack = %config.stack_name,
        cluster = %config.managed_cluster_name,
        "Starting deployment"
    );

    let state_file = config.state_file.clone();
    let snapshot = match &state_file {
        Some(path) => read_snapshot(path).await.map_err(|e| e.to_string())?,
        None => StateSnapshot::default(),
    };

    let cloud = SimulatedCloud::new("00000000-0000-0000-0000-000000000000", config.location.clone())
        .with_snapshot(&snapshot);
    let store = StateStore::new(snapshot);

    let span = tracing::info_span!("deployment");
    let (report, snapshot) = deploy(config, Arc::new(cloud), store)
        .instrument(span)
        .await
        .map_err(|e| e.to_string())?;

    if let Some(path) = &state_file {
        write_snapshot(path, &snapshot)
            .await
            .map_err(|e| e.to_string())?;
    }

    for resource in &report.resources {
        match &resource.status {
            ResourceStatus::Created => info!(resource = %resource.name, "created"),
            ResourceStatus::Unchanged => info!(resource = %resource.name, "unchanged"),
            ResourceStatus::Failed(e) => error!(resource = %resource.name, error = %e, "failed"),
            ResourceStatus::Skipped(e) => warn!(resource = %resource.name, reason = %e, "skipped"),
        }
    }
    for (name, value) in report.exports.iter().filter_map(|(n, v)| Some((n, v.as_ref().ok()?))) {
        match value.as_str() {
            // kubeconfig
            Some(text) if text.contains('\n') => {
                info!(export = %name, lines = text.lines().count(), "exported")
            }
            _ => info!(export = %name, value = %value, "exported"),
        }
    }

    report.ensure_success().map_err(|e| e.to_string())?;
    info!("Deployment completed successfully");
    Ok(())
}
