//! Cluster, service, and task models.

use serde::{Deserialize, Serialize};

/// Which running tasks of a cluster to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFilter {
    /// Tasks belonging to a service.
    Service(String),
    /// Tasks started from a task definition ARN.
    Definition(String),
}

/// A running task instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task ARN.
    pub task_arn: String,
    /// Definition the task was started from.
    pub task_definition_arn: String,
    /// Cluster node hosting the task.
    pub container_instance_arn: Option<String>,
    /// Compute instance behind the cluster node.
    pub instance_id: Option<String>,
    /// Private address of the compute instance.
    pub private_address: Option<String>,
    /// Who started the task.
    pub started_by: Option<String>,
    /// Last reported status, e.g. `RUNNING`.
    pub last_status: String,
}

impl TaskInfo {
    /// One-line label used in selection menus.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} - {} - {}",
            self.private_address.as_deref().unwrap_or("-"),
            crate::identity::short_name(&self.task_definition_arn),
            self.instance_id.as_deref().unwrap_or("-"),
        )
    }
}

/// A rollout of one task definition revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    /// Task definition being rolled out.
    pub task_definition: String,
    /// Rollout status, e.g. `PRIMARY`.
    pub status: String,
    /// Desired task count.
    pub desired_count: i64,
    /// Pending task count.
    pub pending_count: i64,
    /// Running task count.
    pub running_count: i64,
    /// Creation timestamp as reported.
    pub created_at: Option<String>,
}

/// Service summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Current task definition ARN.
    pub task_definition: String,
    /// Desired task count.
    pub desired_count: i64,
    /// Running task count.
    pub running_count: i64,
    /// Pending task count.
    pub pending_count: i64,
    /// Active deployments.
    pub deployments: Vec<Deployment>,
    /// Resource limits of each container in the current task definition.
    #[serde(default)]
    pub containers: Vec<ContainerResources>,
}

/// CPU and memory settings of one container definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerResources {
    /// Container name.
    pub name: String,
    /// CPU units reserved.
    pub cpu: i64,
    /// Soft memory limit in MiB (`memoryReservation`).
    pub memory_reservation: Option<i64>,
    /// Hard memory limit in MiB (`memory`).
    pub memory: Option<i64>,
}

/// A compute node registered with a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerInstanceRef {
    /// Cluster-level node ARN.
    pub arn: String,
    /// Compute instance behind the node.
    pub instance_id: String,
}

/// Request to start a task on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTaskRequest {
    /// Cluster to start in.
    pub cluster: String,
    /// Definition to start.
    pub task_definition: String,
    /// Node to place the task on.
    pub container_instance: String,
    /// Task role override, if the definition carries one.
    pub task_role_arn: Option<String>,
    /// Recorded as `startedBy`; the ownership tag.
    pub started_by: String,
}

/// Placement failure reported for a start request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartFailure {
    /// Resource the failure refers to.
    pub arn: Option<String>,
    /// Provider reason.
    pub reason: String,
}

/// Result of a start request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartTaskOutcome {
    /// Tasks created.
    pub tasks: Vec<TaskInfo>,
    /// Placement failures.
    pub failures: Vec<StartFailure>,
}

/// Changes applied to a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceUpdate {
    /// New desired count.
    pub desired_count: Option<i64>,
    /// New task definition ARN.
    pub task_definition: Option<String>,
    /// Replace all tasks even if nothing changed.
    pub force_new_deployment: bool,
}
