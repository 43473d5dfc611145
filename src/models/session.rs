//! Debug session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a debug session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Resolving cluster, service, and live task.
    SelectingTask,
    /// Looking for a debug task this identity already runs.
    CheckingActiveDebugTask,
    /// Reusing an already running debug task.
    ReuseActive,
    /// No reusable task; a fresh host is needed.
    ProvisionFresh,
    /// Launching the debug instance.
    ProvisioningInstance,
    /// Waiting for the instance to register with the debug cluster.
    AwaitingClusterJoin,
    /// Starting the task copy on the joined node.
    LaunchingTask,
    /// Waiting for the task copy to run.
    AwaitingTaskRunning,
    /// Tunnel to the host's control socket is up.
    TunnelEstablished,
    /// Interactive shell is attached.
    InteractiveExec,
    /// Offering the instance for termination.
    Teardown,
    /// Session finished, successfully or not.
    Terminated,
}

impl SessionState {
    /// Whether an instance may already be held in this state.
    ///
    /// `ProvisioningInstance` holds one as soon as the launch returns its id,
    /// and `ReuseActive` holds the host of the reused task.
    #[must_use]
    pub fn holds_instance(self) -> bool {
        matches!(
            self,
            Self::ReuseActive
                | Self::ProvisioningInstance
                | Self::AwaitingClusterJoin
                | Self::LaunchingTask
                | Self::AwaitingTaskRunning
                | Self::TunnelEstablished
                | Self::InteractiveExec
        )
    }
}

/// One interactive debugging attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebugSession {
    /// Unique session identifier, used in log spans.
    pub id: String,
    /// Cluster of the live task being copied.
    pub cluster: Option<String>,
    /// Service of the live task being copied.
    pub service: Option<String>,
    /// Definition of the live task being copied.
    pub task_definition: Option<String>,
    /// The live task chosen as template.
    pub source_task: Option<String>,
    /// The debug task the shell attaches to.
    pub debug_task: Option<String>,
    /// The host running the debug task.
    pub instance_id: Option<String>,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Every state entered, in order.
    pub history: Vec<SessionState>,
    /// Creation timestamp.
    pub started_at: DateTime<Utc>,
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugSession {
    /// Construct a new session in [`SessionState::SelectingTask`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cluster: None,
            service: None,
            task_definition: None,
            source_task: None,
            debug_task: None,
            instance_id: None,
            state: SessionState::SelectingTask,
            history: vec![SessionState::SelectingTask],
            started_at: Utc::now(),
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState as S;
        if next == S::Terminated {
            return self.state != S::Terminated;
        }
        matches!(
            (self.state, next),
            (S::SelectingTask, S::CheckingActiveDebugTask)
                | (S::CheckingActiveDebugTask, S::ReuseActive | S::ProvisionFresh)
                | (S::ReuseActive, S::TunnelEstablished | S::Teardown)
                | (S::ProvisionFresh, S::ProvisioningInstance)
                | (S::ProvisioningInstance, S::AwaitingClusterJoin | S::Teardown)
                | (S::AwaitingClusterJoin, S::LaunchingTask | S::Teardown)
                | (S::LaunchingTask, S::AwaitingTaskRunning | S::Teardown)
                | (S::AwaitingTaskRunning, S::TunnelEstablished | S::Teardown)
                | (S::TunnelEstablished, S::InteractiveExec | S::Teardown)
                | (S::InteractiveExec, S::Teardown)
        )
    }

    /// Move to `next`, recording it in the history.
    ///
    /// Returns `false` and leaves the session untouched when the
    /// transition is not permitted.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.history.push(next);
        true
    }
}
