//! Cloud provider collaborator interfaces.
//!
//! The [`ComputeApi`] and [`ClusterApi`] traits are the only way the
//! provisioner, orchestrator, and restart controller reach the provider.
//! Implementations are constructed once in `main` and handed down as
//! `Arc<dyn ...>`; the `aws` submodules back them with the AWS command line.

pub mod aws_cli;
pub mod ec2;
pub mod ecs;
pub mod task_definition;

use futures_util::future::BoxFuture;

use crate::models::cluster::{
    ContainerInstanceRef, ServiceStatus, ServiceUpdate, StartTaskOutcome, StartTaskRequest,
    TaskFilter, TaskInfo,
};
use crate::models::compute::{ComputeInstance, LaunchSpec};
use crate::provider::task_definition::EnvChanges;
use crate::Result;

/// Compute lifecycle operations.
pub trait ComputeApi: Send + Sync {
    /// Create a keypair and return its private key material.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) if the
    /// provider rejects the request, e.g. because the name is taken.
    fn create_keypair<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Whether the provider knows a keypair called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failures
    /// other than "not found".
    fn keypair_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Delete the keypair called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) if the
    /// provider rejects the request.
    fn delete_keypair<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Launch an instance and return its id without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) with the
    /// provider's message verbatim.
    fn launch_instance<'a>(&'a self, spec: &'a LaunchSpec) -> BoxFuture<'a, Result<String>>;

    /// Block until the provider reports `instance_id` running, then describe it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) if the
    /// waiter gives up or the instance cannot be described.
    fn wait_instance_running<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Result<ComputeInstance>>;

    /// Terminate an instance.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) if the
    /// provider rejects the request.
    fn terminate_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Describe one instance.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) if the
    /// instance is unknown.
    fn describe_instance<'a>(&'a self, instance_id: &'a str)
        -> BoxFuture<'a, Result<ComputeInstance>>;
}

/// Cluster control operations.
pub trait ClusterApi: Send + Sync {
    /// Names of all clusters.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failure.
    fn list_clusters(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Names of the services in `cluster`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failure.
    fn list_services<'a>(&'a self, cluster: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Summary of one service.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) unless
    /// exactly one service matches.
    fn find_service<'a>(
        &'a self,
        cluster: &'a str,
        service: &'a str,
    ) -> BoxFuture<'a, Result<ServiceStatus>>;

    /// Tasks in `RUNNING` state matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failure.
    fn list_running_tasks<'a>(
        &'a self,
        cluster: &'a str,
        filter: &'a TaskFilter,
    ) -> BoxFuture<'a, Result<Vec<TaskInfo>>>;

    /// Task role declared by a task definition.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failure.
    fn task_role_arn<'a>(&'a self, task_definition: &'a str)
        -> BoxFuture<'a, Result<Option<String>>>;

    /// Start a task on a specific node.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) if the
    /// request itself fails; placement failures are reported in the outcome.
    fn start_task<'a>(
        &'a self,
        request: &'a StartTaskRequest,
    ) -> BoxFuture<'a, Result<StartTaskOutcome>>;

    /// Stop a task.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failure.
    fn stop_task<'a>(&'a self, cluster: &'a str, task_arn: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Block until a task runs, using the provider's own waiter.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) if the
    /// waiter gives up.
    fn wait_task_running<'a>(
        &'a self,
        cluster: &'a str,
        task_arn: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Cluster nodes backed by any of `instance_ids`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failure.
    fn container_instances_for_nodes<'a>(
        &'a self,
        cluster: &'a str,
        instance_ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ContainerInstanceRef>>>;

    /// Compute instance behind a cluster node.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) unless
    /// exactly one node matches.
    fn instance_id_for_container_instance<'a>(
        &'a self,
        cluster: &'a str,
        container_instance_arn: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    /// Apply `update` to a service.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failure.
    fn update_service<'a>(
        &'a self,
        cluster: &'a str,
        service: &'a str,
        update: &'a ServiceUpdate,
    ) -> BoxFuture<'a, Result<()>>;

    /// Register a new revision of `task_definition` with `changes` applied
    /// to every container's environment; returns the new definition ARN.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`](crate::AppError::Provider) on failure.
    fn register_environment_revision<'a>(
        &'a self,
        task_definition: &'a str,
        changes: &'a EnvChanges,
    ) -> BoxFuture<'a, Result<String>>;
}
