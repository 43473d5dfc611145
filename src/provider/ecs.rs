//! [`ClusterApi`] backed by `aws ecs`.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::identity::short_name;
use crate::models::cluster::{
    ContainerInstanceRef, Deployment, ServiceStatus, ServiceUpdate, StartFailure,
    StartTaskOutcome, StartTaskRequest, TaskFilter, TaskInfo,
};
use crate::provider::aws_cli::{arg, AwsCli};
use crate::provider::task_definition::{container_resources, registration_input, EnvChanges};
use crate::provider::ClusterApi;
use crate::{AppError, Result};

/// Upper bound on identifiers per `describe-*` call.
const DESCRIBE_BATCH: usize = 100;

const RUNNING: &str = "RUNNING";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListClustersOutput {
    #[serde(default)]
    cluster_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListServicesOutput {
    #[serde(default)]
    service_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeServicesOutput {
    #[serde(default)]
    services: Vec<EcsService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsService {
    service_name: String,
    #[serde(default)]
    task_definition: String,
    #[serde(default)]
    desired_count: i64,
    #[serde(default)]
    running_count: i64,
    #[serde(default)]
    pending_count: i64,
    #[serde(default)]
    deployments: Vec<EcsDeployment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsDeployment {
    #[serde(default)]
    task_definition: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    desired_count: i64,
    #[serde(default)]
    pending_count: i64,
    #[serde(default)]
    running_count: i64,
    created_at: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksOutput {
    #[serde(default)]
    task_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TasksOutput {
    #[serde(default)]
    tasks: Vec<EcsTask>,
    #[serde(default)]
    failures: Vec<EcsFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsTask {
    task_arn: String,
    #[serde(default)]
    task_definition_arn: String,
    container_instance_arn: Option<String>,
    started_by: Option<String>,
    #[serde(default)]
    last_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsFailure {
    arn: Option<String>,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListContainerInstancesOutput {
    #[serde(default)]
    container_instance_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeContainerInstancesOutput {
    #[serde(default)]
    container_instances: Vec<EcsContainerInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcsContainerInstance {
    container_instance_arn: String,
    ec2_instance_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDefinitionOutput {
    task_definition: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddressesOutput {
    #[serde(default)]
    reservations: Vec<AddressReservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddressReservation {
    #[serde(default)]
    instances: Vec<AddressInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddressInstance {
    instance_id: String,
    private_ip_address: Option<String>,
}

impl From<EcsTask> for TaskInfo {
    fn from(raw: EcsTask) -> Self {
        Self {
            task_arn: raw.task_arn,
            task_definition_arn: raw.task_definition_arn,
            container_instance_arn: raw.container_instance_arn,
            instance_id: None,
            private_address: None,
            started_by: raw.started_by,
            last_status: raw.last_status,
        }
    }
}

impl From<EcsFailure> for StartFailure {
    fn from(raw: EcsFailure) -> Self {
        Self {
            arn: raw.arn,
            reason: raw.reason,
        }
    }
}

impl From<EcsService> for ServiceStatus {
    fn from(raw: EcsService) -> Self {
        Self {
            name: raw.service_name,
            task_definition: raw.task_definition,
            desired_count: raw.desired_count,
            running_count: raw.running_count,
            pending_count: raw.pending_count,
            deployments: raw
                .deployments
                .into_iter()
                .map(|d| Deployment {
                    task_definition: d.task_definition,
                    status: d.status,
                    desired_count: d.desired_count,
                    pending_count: d.pending_count,
                    running_count: d.running_count,
                    created_at: d.created_at.map(|value| match value {
                        Value::String(text) => text,
                        other => other.to_string(),
                    }),
                })
                .collect(),
            containers: Vec::new(),
        }
    }
}

/// Cluster adapter driving `aws ecs`.
#[derive(Debug, Clone)]
pub struct AwsCluster {
    cli: AwsCli,
}

impl AwsCluster {
    /// Wrap a CLI runner.
    #[must_use]
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn describe_tasks(&self, cluster: &str, arns: &[String]) -> Result<Vec<EcsTask>> {
        let mut tasks = Vec::with_capacity(arns.len());
        for batch in arns.chunks(DESCRIBE_BATCH) {
            let mut args = arg("--cluster", cluster).to_vec();
            args.push("--tasks".into());
            args.extend(batch.iter().cloned());
            let out: TasksOutput = self.cli.call("ecs", "describe-tasks", &args).await?;
            for failure in out.failures {
                warn!(arn = ?failure.arn, reason = failure.reason, "describe-tasks failure");
            }
            tasks.extend(out.tasks);
        }
        Ok(tasks)
    }

    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> Result<Vec<ContainerInstanceRef>> {
        let mut refs = Vec::with_capacity(arns.len());
        for batch in arns.chunks(DESCRIBE_BATCH) {
            let mut args = arg("--cluster", cluster).to_vec();
            args.push("--container-instances".into());
            args.extend(batch.iter().cloned());
            let out: DescribeContainerInstancesOutput = self
                .cli
                .call("ecs", "describe-container-instances", &args)
                .await?;
            refs.extend(out.container_instances.into_iter().map(|ci| ContainerInstanceRef {
                arn: ci.container_instance_arn,
                instance_id: ci.ec2_instance_id,
            }));
        }
        Ok(refs)
    }

    async fn private_addresses(&self, instance_ids: &[String]) -> Result<HashMap<String, String>> {
        if instance_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut args = vec!["--instance-ids".to_owned()];
        args.extend(instance_ids.iter().cloned());
        let out: AddressesOutput = self.cli.call("ec2", "describe-instances", &args).await?;
        Ok(out
            .reservations
            .into_iter()
            .flat_map(|reservation| reservation.instances)
            .filter_map(|instance| {
                instance
                    .private_ip_address
                    .map(|address| (instance.instance_id, address))
            })
            .collect())
    }

    /// Fill in host instance and address for each task.
    async fn enrich(&self, cluster: &str, tasks: Vec<EcsTask>) -> Result<Vec<TaskInfo>> {
        let mut infos: Vec<TaskInfo> = tasks.into_iter().map(TaskInfo::from).collect();

        let mut node_arns: Vec<String> = infos
            .iter()
            .filter_map(|task| task.container_instance_arn.clone())
            .collect();
        node_arns.sort();
        node_arns.dedup();
        if node_arns.is_empty() {
            return Ok(infos);
        }

        let nodes: HashMap<String, String> = self
            .describe_container_instances(cluster, &node_arns)
            .await?
            .into_iter()
            .map(|node| (node.arn, node.instance_id))
            .collect();

        let mut instance_ids: Vec<String> = nodes.values().cloned().collect();
        instance_ids.sort();
        instance_ids.dedup();
        let addresses = self.private_addresses(&instance_ids).await?;

        for info in &mut infos {
            let instance_id = info
                .container_instance_arn
                .as_ref()
                .and_then(|arn| nodes.get(arn))
                .cloned();
            info.private_address = instance_id
                .as_ref()
                .and_then(|id| addresses.get(id))
                .cloned();
            info.instance_id = instance_id;
        }
        Ok(infos)
    }

    async fn describe_task_definition(&self, task_definition: &str) -> Result<Value> {
        let out: TaskDefinitionOutput = self
            .cli
            .call(
                "ecs",
                "describe-task-definition",
                &arg("--task-definition", task_definition),
            )
            .await?;
        Ok(out.task_definition)
    }
}

impl ClusterApi for AwsCluster {
    fn list_clusters(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let out: ListClustersOutput = self.cli.call("ecs", "list-clusters", &[]).await?;
            Ok(out
                .cluster_arns
                .iter()
                .map(|arn| short_name(arn).to_owned())
                .collect())
        })
    }

    fn list_services<'a>(&'a self, cluster: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let out: ListServicesOutput = self
                .cli
                .call("ecs", "list-services", &arg("--cluster", cluster))
                .await?;
            Ok(out
                .service_arns
                .iter()
                .map(|arn| short_name(arn).to_owned())
                .collect())
        })
    }

    fn find_service<'a>(
        &'a self,
        cluster: &'a str,
        service: &'a str,
    ) -> BoxFuture<'a, Result<ServiceStatus>> {
        Box::pin(async move {
            let mut args = arg("--cluster", cluster).to_vec();
            args.extend(arg("--services", service));
            let out: DescribeServicesOutput =
                self.cli.call("ecs", "describe-services", &args).await?;

            let mut services = out.services;
            if services.len() != 1 {
                return Err(AppError::Provider(format!(
                    "expected one service named {service} in {cluster}, found {}",
                    services.len()
                )));
            }
            let mut status: ServiceStatus = services.remove(0).into();
            let definition = self.describe_task_definition(&status.task_definition).await?;
            status.containers = container_resources(&definition);
            Ok(status)
        })
    }

    fn list_running_tasks<'a>(
        &'a self,
        cluster: &'a str,
        filter: &'a TaskFilter,
    ) -> BoxFuture<'a, Result<Vec<TaskInfo>>> {
        Box::pin(async move {
            let mut args = arg("--cluster", cluster).to_vec();
            args.extend(arg("--desired-status", RUNNING));
            if let TaskFilter::Service(service) = filter {
                args.extend(arg("--service-name", service.as_str()));
            }

            let out: ListTasksOutput = self.cli.call("ecs", "list-tasks", &args).await?;
            if out.task_arns.is_empty() {
                debug!(cluster, ?filter, "no tasks listed");
                return Ok(Vec::new());
            }

            let tasks: Vec<EcsTask> = self
                .describe_tasks(cluster, &out.task_arns)
                .await?
                .into_iter()
                .filter(|task| task.last_status == RUNNING)
                .filter(|task| match filter {
                    TaskFilter::Service(_) => true,
                    TaskFilter::Definition(def) => task.task_definition_arn == *def,
                })
                .collect();

            self.enrich(cluster, tasks).await
        })
    }

    fn task_role_arn<'a>(
        &'a self,
        task_definition: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let definition = self.describe_task_definition(task_definition).await?;
            Ok(definition
                .get("taskRoleArn")
                .and_then(Value::as_str)
                .map(str::to_owned))
        })
    }

    fn start_task<'a>(
        &'a self,
        request: &'a StartTaskRequest,
    ) -> BoxFuture<'a, Result<StartTaskOutcome>> {
        Box::pin(async move {
            let mut args = arg("--cluster", request.cluster.as_str()).to_vec();
            args.extend(arg("--task-definition", request.task_definition.as_str()));
            args.extend(arg(
                "--container-instances",
                request.container_instance.as_str(),
            ));
            args.extend(arg("--started-by", request.started_by.as_str()));
            if let Some(ref role) = request.task_role_arn {
                let overrides = serde_json::json!({ "taskRoleArn": role });
                args.extend(arg("--overrides", overrides.to_string()));
            }

            let out: TasksOutput = self.cli.call("ecs", "start-task", &args).await?;
            info!(
                tasks = out.tasks.len(),
                failures = out.failures.len(),
                "start-task returned"
            );
            Ok(StartTaskOutcome {
                tasks: out.tasks.into_iter().map(TaskInfo::from).collect(),
                failures: out.failures.into_iter().map(StartFailure::from).collect(),
            })
        })
    }

    fn stop_task<'a>(&'a self, cluster: &'a str, task_arn: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut args = arg("--cluster", cluster).to_vec();
            args.extend(arg("--task", task_arn));
            self.cli.call_unit("ecs", "stop-task", &args).await
        })
    }

    fn wait_task_running<'a>(
        &'a self,
        cluster: &'a str,
        task_arn: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut args = arg("--cluster", cluster).to_vec();
            args.extend(arg("--tasks", task_arn));
            self.cli.call_unit("ecs", "wait tasks-running", &args).await
        })
    }

    fn container_instances_for_nodes<'a>(
        &'a self,
        cluster: &'a str,
        instance_ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ContainerInstanceRef>>> {
        Box::pin(async move {
            let out: ListContainerInstancesOutput = self
                .cli
                .call("ecs", "list-container-instances", &arg("--cluster", cluster))
                .await?;
            if out.container_instance_arns.is_empty() {
                return Ok(Vec::new());
            }

            Ok(self
                .describe_container_instances(cluster, &out.container_instance_arns)
                .await?
                .into_iter()
                .filter(|node| instance_ids.contains(&node.instance_id))
                .collect())
        })
    }

    fn instance_id_for_container_instance<'a>(
        &'a self,
        cluster: &'a str,
        container_instance_arn: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut nodes = self
                .describe_container_instances(cluster, &[container_instance_arn.to_owned()])
                .await?;
            if nodes.len() != 1 {
                return Err(AppError::Provider(format!(
                    "expected one node for {container_instance_arn}, found {}",
                    nodes.len()
                )));
            }
            Ok(nodes.remove(0).instance_id)
        })
    }

    fn update_service<'a>(
        &'a self,
        cluster: &'a str,
        service: &'a str,
        update: &'a ServiceUpdate,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut args = arg("--cluster", cluster).to_vec();
            args.extend(arg("--service", service));
            if let Some(count) = update.desired_count {
                args.extend(arg("--desired-count", count.to_string()));
            }
            if let Some(ref definition) = update.task_definition {
                args.extend(arg("--task-definition", definition.as_str()));
            }
            if update.force_new_deployment {
                args.push("--force-new-deployment".into());
            }
            self.cli.call_unit("ecs", "update-service", &args).await
        })
    }

    fn register_environment_revision<'a>(
        &'a self,
        task_definition: &'a str,
        changes: &'a EnvChanges,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let current = self.describe_task_definition(task_definition).await?;
            let (input, changed) = registration_input(&current, changes)?;
            if !changed {
                info!(task_definition, "environment already up to date");
                return current
                    .get("taskDefinitionArn")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        AppError::Provider("task definition has no taskDefinitionArn".into())
                    });
            }

            let out: TaskDefinitionOutput = self
                .cli
                .call(
                    "ecs",
                    "register-task-definition",
                    &arg("--cli-input-json", input.to_string()),
                )
                .await?;
            let arn = out
                .task_definition
                .get("taskDefinitionArn")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| {
                    AppError::Provider("register-task-definition returned no ARN".into())
                })?;
            info!(task_definition = arn, "registered new revision");
            Ok(arn)
        })
    }
}
