//! Service inspection and environment updates.

use tracing::info;

use crate::models::cluster::{ServiceStatus, ServiceUpdate};
use crate::provider::task_definition::EnvChanges;
use crate::provider::ClusterApi;
use crate::{AppError, Result};

/// Services grouped by cluster, both sorted by name.
///
/// # Errors
///
/// Returns provider errors.
pub async fn list_services(cluster_api: &dyn ClusterApi) -> Result<Vec<(String, Vec<String>)>> {
    let mut clusters = cluster_api.list_clusters().await?;
    clusters.sort();

    let mut listing = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let mut services = cluster_api.list_services(&cluster).await?;
        services.sort();
        listing.push((cluster, services));
    }
    Ok(listing)
}

/// Human-readable summary of a service, its deployments, and the resource
/// limits of its containers. Absent memory limits print as `-`.
#[must_use]
pub fn render_status(status: &ServiceStatus) -> String {
    let mut out = format!(
        "{}  desired={} running={} pending={}\n  task definition: {}\n",
        status.name,
        status.desired_count,
        status.running_count,
        status.pending_count,
        status.task_definition
    );
    for deployment in &status.deployments {
        out.push_str(&format!(
            "  - {:<8} {}  desired={} pending={} running={}{}\n",
            deployment.status,
            crate::identity::short_name(&deployment.task_definition),
            deployment.desired_count,
            deployment.pending_count,
            deployment.running_count,
            deployment
                .created_at
                .as_deref()
                .map(|at| format!("  created={at}"))
                .unwrap_or_default(),
        ));
    }
    for container in &status.containers {
        out.push_str(&format!(
            "  container {}: cpu={} soft memory={} hard memory={}\n",
            container.name,
            container.cpu,
            limit(container.memory_reservation),
            limit(container.memory),
        ));
    }
    out
}

fn limit(mib: Option<i64>) -> String {
    mib.map_or_else(|| "-".to_owned(), |mib| mib.to_string())
}

/// Register a revision with `changes` and point the service at it.
///
/// Returns the definition the service runs afterwards.
///
/// # Errors
///
/// Returns `AppError::Config` for an empty change set and provider errors.
pub async fn update_environment(
    cluster_api: &dyn ClusterApi,
    cluster: &str,
    service: &str,
    changes: &EnvChanges,
) -> Result<String> {
    if changes.is_empty() {
        return Err(AppError::Config("no environment changes given".into()));
    }

    let status = cluster_api.find_service(cluster, service).await?;
    let revision = cluster_api
        .register_environment_revision(&status.task_definition, changes)
        .await?;

    if revision == status.task_definition {
        info!(service, task_definition = revision, "environment unchanged");
        return Ok(revision);
    }

    let update = ServiceUpdate {
        task_definition: Some(revision.clone()),
        ..ServiceUpdate::default()
    };
    cluster_api.update_service(cluster, service, &update).await?;
    info!(service, task_definition = revision, "service updated");
    Ok(revision)
}
