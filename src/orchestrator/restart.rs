//! Service restart strategies.
//!
//! The rotating restart retires one task at a time and waits for the
//! scheduler to restore the original running count before the next stop.
//! The scheduler's own count is the only source of truth; it is polled at a
//! fixed interval within a bounded budget.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::models::cluster::{ServiceUpdate, TaskFilter};
use crate::prompt::Prompter;
use crate::provider::ClusterApi;
use crate::{AppError, Result};

/// Snapshot of the tasks to retire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPlan {
    /// Cluster of the service.
    pub cluster: String,
    /// Service being restarted.
    pub service: String,
    /// Tasks still to retire.
    pub remaining: VecDeque<String>,
    /// Tasks already stopped and replaced.
    pub retired: Vec<String>,
    /// Running count captured when the plan was made.
    pub initial_count: usize,
}

/// Terminal state of a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartState {
    /// Every planned task was retired and replaced.
    Completed,
}

/// Result of a finished restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartReport {
    /// Tasks retired, in stop order.
    pub retired: Vec<String>,
    /// Terminal state.
    pub state: RestartState,
}

/// One-by-one task replacement for a service.
pub struct RollingRestart {
    cluster: Arc<dyn ClusterApi>,
    interval: Duration,
    budget: Duration,
}

impl RollingRestart {
    /// Build with the `[restart]` poll settings of `config`.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>, config: &GlobalConfig) -> Self {
        Self::with_polling(
            cluster,
            config.restart_poll_interval(),
            config.restart_poll_budget(),
        )
    }

    /// Build with explicit poll settings.
    #[must_use]
    pub fn with_polling(cluster: Arc<dyn ClusterApi>, interval: Duration, budget: Duration) -> Self {
        Self {
            cluster,
            interval,
            budget,
        }
    }

    /// Capture the running tasks of `service`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InsufficientInstances` if fewer than two tasks run.
    pub async fn plan(&self, cluster: &str, service: &str) -> Result<RestartPlan> {
        let tasks = self
            .cluster
            .list_running_tasks(cluster, &TaskFilter::Service(service.to_owned()))
            .await?;

        if tasks.len() < 2 {
            return Err(AppError::InsufficientInstances(tasks.len()));
        }

        Ok(RestartPlan {
            cluster: cluster.to_owned(),
            service: service.to_owned(),
            initial_count: tasks.len(),
            remaining: tasks.into_iter().map(|task| task.task_arn).collect(),
            retired: Vec::new(),
        })
    }

    /// Plan, confirm with the operator, and execute.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Aborted` if the operator declines, plus every error
    /// of [`Self::plan`] and [`Self::execute`].
    pub async fn run(
        &self,
        prompter: &dyn Prompter,
        cluster: &str,
        service: &str,
    ) -> Result<RestartReport> {
        let plan = self.plan(cluster, service).await?;
        let question = format!(
            "Restart {} task(s) of {service} one at a time?",
            plan.initial_count
        );
        if !prompter.confirm(&question)? {
            return Err(AppError::Aborted("rotating restart declined".into()));
        }
        self.execute(plan).await
    }

    /// Retire every planned task, one at a time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PollTimeout` with the partial progress if a
    /// replacement does not appear within the budget, and provider errors
    /// from stop calls.
    pub async fn execute(&self, mut plan: RestartPlan) -> Result<RestartReport> {
        let span = info_span!("rolling_restart", cluster = plan.cluster, service = plan.service);
        async move {
            info!(tasks = plan.initial_count, "rolling restart started");

            while let Some(task_arn) = plan.remaining.pop_front() {
                info!(task = task_arn, left = plan.remaining.len(), "stopping task");
                self.cluster.stop_task(&plan.cluster, &task_arn).await?;
                plan.retired.push(task_arn.clone());

                if let Err(err) = self.wait_restored(&plan, &task_arn).await {
                    warn!(
                        retired = ?plan.retired,
                        remaining = ?plan.remaining,
                        "rolling restart stopped before completion"
                    );
                    return Err(err);
                }
            }

            info!(retired = plan.retired.len(), "rolling restart completed");
            Ok(RestartReport {
                retired: plan.retired,
                state: RestartState::Completed,
            })
        }
        .instrument(span)
        .await
    }

    async fn wait_restored(&self, plan: &RestartPlan, retired_arn: &str) -> Result<()> {
        let filter = TaskFilter::Service(plan.service.clone());
        let mut waited = Duration::ZERO;

        while waited < self.budget {
            tokio::time::sleep(self.interval).await;
            waited += self.interval;

            match self.cluster.list_running_tasks(&plan.cluster, &filter).await {
                Ok(tasks) => {
                    let still_live = tasks.iter().any(|task| task.task_arn == retired_arn);
                    debug!(running = tasks.len(), still_live, "replacement poll");
                    if tasks.len() == plan.initial_count && !still_live {
                        info!(running = tasks.len(), "running count restored");
                        return Ok(());
                    }
                }
                Err(err) => warn!(%err, "replacement poll failed"),
            }
        }

        Err(AppError::PollTimeout {
            retired: plan.retired.len(),
            remaining: plan.remaining.len(),
        })
    }
}

/// Stop every running task of `service` at once after the operator types
/// `KILL <SERVICE>`. Returns the number of tasks stopped.
///
/// # Errors
///
/// Returns `AppError::Aborted` if the phrase does not match.
pub async fn terminate_all(
    cluster_api: &dyn ClusterApi,
    prompter: &dyn Prompter,
    cluster: &str,
    service: &str,
) -> Result<usize> {
    let tasks = cluster_api
        .list_running_tasks(cluster, &TaskFilter::Service(service.to_owned()))
        .await?;

    let phrase = format!("KILL {}", service.to_uppercase());
    warn!(service, tasks = tasks.len(), "about to stop every task of the service");
    if !prompter.confirm_phrase(&phrase)? {
        return Err(AppError::Aborted(format!("confirmation phrase '{phrase}' not entered")));
    }

    for task in &tasks {
        cluster_api.stop_task(cluster, &task.task_arn).await?;
        info!(task = task.task_arn, "task stopped");
    }
    Ok(tasks.len())
}

/// Ask the scheduler to replace every task through a new deployment.
///
/// # Errors
///
/// Returns provider errors from the service update.
pub async fn graceful_restart(cluster_api: &dyn ClusterApi, cluster: &str, service: &str) -> Result<()> {
    let update = ServiceUpdate {
        force_new_deployment: true,
        ..ServiceUpdate::default()
    };
    cluster_api.update_service(cluster, service, &update).await?;
    info!(cluster, service, "new deployment forced");
    Ok(())
}
