//! Compute provisioning for debug sessions.
//!
//! Covers the keypair, the debug instance cloned from a live task's host,
//! waiting for that instance to join the debug cluster, and starting the
//! task copy on it. Every failure here is fatal to the session; nothing is
//! retried automatically.

pub mod keypair;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::identity::Identity;
use crate::models::cluster::{ContainerInstanceRef, StartTaskRequest, TaskInfo};
use crate::models::compute::{ComputeInstance, LaunchSpec};
use crate::provider::{ClusterApi, ComputeApi};
use crate::{AppError, Result};

pub use keypair::{ensure_keypair, keypair_presence, purge_keypair};

/// Bootstrap script registering the node into `cluster` with a `group`
/// attribute equal to `identifier`.
#[must_use]
pub fn build_user_data(cluster: &str, identifier: &str) -> String {
    format!(
        "#!/bin/bash\n\
         echo ECS_CLUSTER={cluster} >> /etc/ecs/ecs.config\n\
         echo ECS_INSTANCE_ATTRIBUTES={{\\\"group\\\": \\\"{identifier}\\\"}} >> /etc/ecs/ecs.config\n"
    )
}

/// Launch parameters for a debug copy of `template`.
///
/// # Errors
///
/// Returns `AppError::Provisioning` if the template lacks an image, subnet,
/// or instance profile.
pub fn launch_spec_from_template(
    template: &ComputeInstance,
    instance_type: &str,
    debug_cluster: &str,
    identity: &Identity,
    task_definition: &str,
) -> Result<LaunchSpec> {
    let missing = |field: &str| {
        AppError::Provisioning(format!("template instance {} has no {field}", template.id))
    };
    let identifier = identity.session_identifier(task_definition);

    Ok(LaunchSpec {
        image_id: template.image_id.clone().ok_or_else(|| missing("image"))?,
        instance_type: instance_type.to_owned(),
        key_name: identity.keypair_name(),
        subnet_id: template.subnet_id.clone().ok_or_else(|| missing("subnet"))?,
        security_group_ids: template.security_group_ids.clone(),
        iam_instance_profile: template
            .iam_instance_profile
            .clone()
            .ok_or_else(|| missing("instance profile"))?,
        user_data: build_user_data(debug_cluster, &identifier),
        name_tag: identifier,
    })
}

/// Provisions debug hosts and the task copies running on them.
#[derive(Clone)]
pub struct Provisioner {
    compute: Arc<dyn ComputeApi>,
    cluster: Arc<dyn ClusterApi>,
    debug_cluster: String,
    instance_type: String,
    join_attempts: u32,
    join_interval: Duration,
}

impl Provisioner {
    /// Build a provisioner using the `[debug]` settings of `config`.
    #[must_use]
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        cluster: Arc<dyn ClusterApi>,
        config: &GlobalConfig,
    ) -> Self {
        Self {
            compute,
            cluster,
            debug_cluster: config.debug.cluster.clone(),
            instance_type: config.debug.instance_type.clone(),
            join_attempts: config.debug.join_attempts,
            join_interval: config.join_interval(),
        }
    }

    /// Override the cluster-join poll bounds.
    #[must_use]
    pub fn with_join_policy(mut self, attempts: u32, interval: Duration) -> Self {
        self.join_attempts = attempts.max(1);
        self.join_interval = interval;
        self
    }

    /// Name of the cluster debug hosts register into.
    #[must_use]
    pub fn debug_cluster(&self) -> &str {
        &self.debug_cluster
    }

    /// Launch a debug host cloned from `template_instance_id` and return its
    /// id. The host may still be pending; see [`Self::await_instance_running`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provisioning` with the provider message on any
    /// failure.
    pub async fn launch_instance(
        &self,
        identity: &Identity,
        template_instance_id: &str,
        task_definition: &str,
    ) -> Result<String> {
        let template = self
            .compute
            .describe_instance(template_instance_id)
            .await
            .map_err(|err| {
                AppError::Provisioning(format!(
                    "cannot read template instance {template_instance_id}: {err}"
                ))
            })?;

        let spec = launch_spec_from_template(
            &template,
            &self.instance_type,
            &self.debug_cluster,
            identity,
            task_definition,
        )?;
        info!(
            name = spec.name_tag,
            image = spec.image_id,
            instance_type = spec.instance_type,
            "launching debug instance"
        );

        self.compute
            .launch_instance(&spec)
            .await
            .map_err(|err| AppError::Provisioning(err.to_string()))
    }

    /// Block until a launched host runs and return its description.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provisioning` if the host never reaches running.
    pub async fn await_instance_running(&self, instance_id: &str) -> Result<ComputeInstance> {
        self.compute
            .wait_instance_running(instance_id)
            .await
            .map_err(|err| {
                AppError::Provisioning(format!("{instance_id} did not reach running: {err}"))
            })
    }

    /// Poll the debug cluster until exactly one node maps to `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AmbiguousJoin` if several nodes match and
    /// `AppError::JoinTimeout` once the attempts are used up.
    pub async fn await_cluster_join(&self, instance_id: &str) -> Result<ContainerInstanceRef> {
        let ids = [instance_id.to_owned()];

        for attempt in 1..=self.join_attempts {
            match self
                .cluster
                .container_instances_for_nodes(&self.debug_cluster, &ids)
                .await
            {
                Ok(mut nodes) if nodes.len() == 1 => {
                    let node = nodes.remove(0);
                    info!(instance_id, node = node.arn, attempt, "instance joined cluster");
                    return Ok(node);
                }
                Ok(nodes) if nodes.len() > 1 => {
                    return Err(AppError::AmbiguousJoin(format!(
                        "{} nodes in {} map to {instance_id}",
                        nodes.len(),
                        self.debug_cluster
                    )));
                }
                Ok(_) => debug!(instance_id, attempt, "instance not registered yet"),
                Err(err) => warn!(instance_id, attempt, %err, "cluster join poll failed"),
            }

            if attempt < self.join_attempts {
                tokio::time::sleep(self.join_interval).await;
            }
        }

        Err(AppError::JoinTimeout(format!(
            "{instance_id} did not join {} after {} attempts",
            self.debug_cluster, self.join_attempts
        )))
    }

    /// Start a copy of `task_definition` on `node`, owned by `identity`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TaskLaunch` if the start fails, reports placement
    /// failures, or yields other than one task.
    pub async fn start_task(
        &self,
        identity: &Identity,
        task_definition: &str,
        node: &ContainerInstanceRef,
    ) -> Result<TaskInfo> {
        let task_role_arn = self
            .cluster
            .task_role_arn(task_definition)
            .await
            .map_err(|err| AppError::TaskLaunch(format!("cannot read task role: {err}")))?;

        let request = StartTaskRequest {
            cluster: self.debug_cluster.clone(),
            task_definition: task_definition.to_owned(),
            container_instance: node.arn.clone(),
            task_role_arn,
            started_by: identity.keypair_name(),
        };

        let outcome = self
            .cluster
            .start_task(&request)
            .await
            .map_err(|err| AppError::TaskLaunch(err.to_string()))?;

        if !outcome.failures.is_empty() {
            let reasons: Vec<String> = outcome
                .failures
                .iter()
                .map(|failure| match failure.arn {
                    Some(ref arn) => format!("{arn}: {}", failure.reason),
                    None => failure.reason.clone(),
                })
                .collect();
            return Err(AppError::TaskLaunch(reasons.join("; ")));
        }

        let mut tasks = outcome.tasks;
        if tasks.len() != 1 {
            return Err(AppError::TaskLaunch(format!(
                "expected one task, cluster reported {}",
                tasks.len()
            )));
        }
        let mut task = tasks.remove(0);
        task.instance_id = Some(node.instance_id.clone());
        info!(task = task.task_arn, node = node.arn, "debug task started");
        Ok(task)
    }

    /// Block until `task_arn` runs in the debug cluster.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TaskStartTimeout` if the cluster's waiter gives up.
    pub async fn await_task_running(&self, task_arn: &str) -> Result<()> {
        self.cluster
            .wait_task_running(&self.debug_cluster, task_arn)
            .await
            .map_err(|err| AppError::TaskStartTimeout(format!("{task_arn}: {err}")))?;
        info!(task = task_arn, "debug task running");
        Ok(())
    }
}
