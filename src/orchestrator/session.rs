//! Debug session state machine.
//!
//! Resolves a live task, reuses or provisions a debug copy of it, opens the
//! interactive shell, and offers teardown of whatever instance it holds.
//! Teardown runs on every path once an instance is held; when both the main
//! path and teardown fail, the main path's error wins.

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::identity::Identity;
use crate::keystore::KeyStore;
use crate::models::cluster::{TaskFilter, TaskInfo};
use crate::models::session::{DebugSession, SessionState};
use crate::orchestrator::shell::RemoteShell;
use crate::prompt::Prompter;
use crate::provider::{ClusterApi, ComputeApi};
use crate::provision::{ensure_keypair, Provisioner};
use crate::{AppError, Result};

/// Outcome of a completed session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Final session record, including its state history.
    pub session: DebugSession,
    /// Exit code of the remote command.
    pub exit_code: i64,
}

/// Drives one interactive debug session.
pub struct SessionOrchestrator {
    compute: Arc<dyn ComputeApi>,
    cluster: Arc<dyn ClusterApi>,
    keys: Arc<dyn KeyStore>,
    prompter: Arc<dyn Prompter>,
    shell: Arc<dyn RemoteShell>,
    provisioner: Provisioner,
    identity: Identity,
}

impl SessionOrchestrator {
    /// Wire the orchestrator to its collaborators.
    #[must_use]
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        cluster: Arc<dyn ClusterApi>,
        keys: Arc<dyn KeyStore>,
        prompter: Arc<dyn Prompter>,
        shell: Arc<dyn RemoteShell>,
        identity: Identity,
        config: &GlobalConfig,
    ) -> Self {
        let provisioner = Provisioner::new(Arc::clone(&compute), Arc::clone(&cluster), config);
        Self {
            compute,
            cluster,
            keys,
            prompter,
            shell,
            provisioner,
            identity,
        }
    }

    /// Replace the provisioner, e.g. to shorten the join poll.
    #[must_use]
    pub fn with_provisioner(mut self, provisioner: Provisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// Run a session. `cluster` and `service` skip their prompts when given.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the session, or the teardown error
    /// if only teardown failed.
    pub async fn run(&self, cluster: Option<&str>, service: Option<&str>) -> Result<SessionReport> {
        let mut session = DebugSession::new();
        let span = info_span!("session", session_id = %session.id, user = self.identity.user());

        async move {
            info!("debug session started");
            let outcome = self.drive(&mut session, cluster, service).await;

            let outcome = if session.instance_id.is_some() && session.state.holds_instance() {
                self.enter(&mut session, SessionState::Teardown);
                let teardown = self.teardown(&session).await;
                match (outcome, teardown) {
                    (Err(err), Err(teardown_err)) => {
                        warn!(%teardown_err, "teardown failed after session error");
                        Err(err)
                    }
                    (Ok(_), Err(teardown_err)) => Err(teardown_err),
                    (outcome, Ok(())) => outcome,
                }
            } else {
                outcome
            };

            self.enter(&mut session, SessionState::Terminated);
            match outcome {
                Ok(exit_code) => {
                    info!(exit_code, "debug session finished");
                    Ok(SessionReport { session, exit_code })
                }
                Err(err) => {
                    warn!(%err, "debug session failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn enter(&self, session: &mut DebugSession, next: SessionState) {
        let from = session.state;
        if session.advance(next) {
            info!(session_id = %session.id, state = ?next, from = ?from, "session state");
        } else {
            warn!(session_id = %session.id, state = ?next, from = ?from, "illegal session transition ignored");
        }
    }

    async fn drive(
        &self,
        session: &mut DebugSession,
        cluster: Option<&str>,
        service: Option<&str>,
    ) -> Result<i64> {
        let source = self.select_task(session, cluster, service).await?;

        self.enter(session, SessionState::CheckingActiveDebugTask);
        let (debug_task, host) = match self.find_active_debug_task(&source).await? {
            Some(active) => {
                self.enter(session, SessionState::ReuseActive);
                info!(task = active.task_arn, "reusing running debug task");
                session.instance_id.clone_from(&active.instance_id);
                session.debug_task = Some(active.task_arn.clone());
                let host = active.private_address.clone().ok_or_else(|| {
                    AppError::Tunnel(format!("debug task {} has no host address", active.task_arn))
                })?;
                (active, host)
            }
            None => {
                self.enter(session, SessionState::ProvisionFresh);
                self.provision(session, &source).await?
            }
        };

        self.enter(session, SessionState::TunnelEstablished);
        let mut connection = self.shell.connect(&host).await?;

        self.enter(session, SessionState::InteractiveExec);
        let result = connection.exec(&debug_task.task_arn).await;
        connection.close().await;
        result
    }

    async fn select_task(
        &self,
        session: &mut DebugSession,
        cluster: Option<&str>,
        service: Option<&str>,
    ) -> Result<TaskInfo> {
        let cluster = match cluster {
            Some(name) => name.to_owned(),
            None => {
                let clusters = self.cluster.list_clusters().await?;
                let index = self.prompter.pick("cluster", &clusters)?;
                clusters
                    .get(index)
                    .cloned()
                    .ok_or_else(|| AppError::NoTaskSelected("no cluster chosen".into()))?
            }
        };

        let service = match service {
            Some(name) => name.to_owned(),
            None => {
                let services = self.cluster.list_services(&cluster).await?;
                let index = self.prompter.pick("service", &services)?;
                services
                    .get(index)
                    .cloned()
                    .ok_or_else(|| AppError::NoTaskSelected("no service chosen".into()))?
            }
        };

        let mut tasks = self
            .cluster
            .list_running_tasks(&cluster, &TaskFilter::Service(service.clone()))
            .await?;
        if tasks.is_empty() {
            return Err(AppError::NoTaskSelected(format!(
                "service {service} in {cluster} has no running tasks"
            )));
        }
        let labels: Vec<String> = tasks.iter().map(TaskInfo::describe).collect();
        let index = self.prompter.pick("task", &labels)?;
        if index >= tasks.len() {
            return Err(AppError::NoTaskSelected("no task chosen".into()));
        }
        let task = tasks.swap_remove(index);

        info!(cluster, service, task = task.task_arn, "selected live task");
        session.cluster = Some(cluster);
        session.service = Some(service);
        session.task_definition = Some(task.task_definition_arn.clone());
        session.source_task = Some(task.task_arn.clone());
        Ok(task)
    }

    async fn find_active_debug_task(&self, source: &TaskInfo) -> Result<Option<TaskInfo>> {
        let owner = self.identity.keypair_name();
        let mut candidates: Vec<TaskInfo> = self
            .cluster
            .list_running_tasks(
                self.provisioner.debug_cluster(),
                &TaskFilter::Definition(source.task_definition_arn.clone()),
            )
            .await?
            .into_iter()
            .filter(|task| task.started_by.as_deref() == Some(owner.as_str()))
            .collect();

        if candidates.len() > 1 {
            warn!(count = candidates.len(), "several debug tasks running, using the first");
        }
        Ok(if candidates.is_empty() {
            None
        } else {
            Some(candidates.remove(0))
        })
    }

    async fn provision(
        &self,
        session: &mut DebugSession,
        source: &TaskInfo,
    ) -> Result<(TaskInfo, String)> {
        let template = source.instance_id.as_deref().ok_or_else(|| {
            AppError::Provisioning(format!("task {} has no known host", source.task_arn))
        })?;

        self.enter(session, SessionState::ProvisioningInstance);
        ensure_keypair(self.compute.as_ref(), self.keys.as_ref(), &self.identity).await?;
        let instance_id = self
            .provisioner
            .launch_instance(&self.identity, template, &source.task_definition_arn)
            .await?;
        session.instance_id = Some(instance_id.clone());
        let instance = self.provisioner.await_instance_running(&instance_id).await?;
        self.enter(session, SessionState::AwaitingClusterJoin);

        let node = self.provisioner.await_cluster_join(&instance.id).await?;

        self.enter(session, SessionState::LaunchingTask);
        let task = self
            .provisioner
            .start_task(&self.identity, &source.task_definition_arn, &node)
            .await?;
        session.debug_task = Some(task.task_arn.clone());

        self.enter(session, SessionState::AwaitingTaskRunning);
        self.provisioner.await_task_running(&task.task_arn).await?;

        let host = instance.private_address.clone().ok_or_else(|| {
            AppError::Tunnel(format!("instance {} has no private address", instance.id))
        })?;
        Ok((task, host))
    }

    async fn teardown(&self, session: &DebugSession) -> Result<()> {
        let Some(ref instance_id) = session.instance_id else {
            return Ok(());
        };

        let question = format!("Do you want the instance {instance_id} to terminate?");
        if !self.prompter.confirm(&question)? {
            info!(instance_id, "keeping debug instance");
            return Ok(());
        }

        let instance = self.compute.describe_instance(instance_id).await?;
        if !self.identity.owns_key(instance.key_name.as_deref()) {
            return Err(AppError::OwnershipViolation(format!(
                "instance {instance_id} uses key {:?}, not {}",
                instance.key_name,
                self.identity.keypair_name()
            )));
        }

        if let Some(ref definition) = session.task_definition {
            let expected = self.identity.session_identifier(definition);
            if instance.name_tag() != Some(expected.as_str()) {
                return Err(AppError::OwnershipViolation(format!(
                    "instance {instance_id} is tagged {:?}, expected {expected}",
                    instance.name_tag()
                )));
            }
        }

        self.compute.terminate_instance(instance_id).await?;
        info!(instance_id, "debug instance terminated");
        Ok(())
    }
}
