//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A cloud provider call failed outside of provisioning.
    Provider(String),
    /// Keypair creation, instance launch, or template lookup failed.
    Provisioning(String),
    /// Remote and local keypair existence disagree; operator must purge.
    KeypairInconsistent {
        /// Keypair name being checked.
        name: String,
        /// Whether the provider knows the keypair.
        remote: bool,
        /// Whether the private key exists on disk.
        local: bool,
    },
    /// The debug instance never registered with the debug cluster.
    JoinTimeout(String),
    /// More than one cluster node maps to the same instance.
    AmbiguousJoin(String),
    /// The cluster refused or misreported the debug task start.
    TaskLaunch(String),
    /// The debug task did not reach the running state.
    TaskStartTimeout(String),
    /// The authenticated transport or local endpoint could not be set up.
    Tunnel(String),
    /// No remote container carries the target task label.
    ContainerNotFound(String),
    /// The interactive execution channel failed.
    Exec(String),
    /// Caller does not own the resource it tried to destroy.
    OwnershipViolation(String),
    /// Rolling restart gave up waiting for the running count to recover.
    PollTimeout {
        /// Tasks already stopped before the timeout.
        retired: usize,
        /// Tasks still waiting to be retired.
        remaining: usize,
    },
    /// Rolling restart needs at least two running tasks.
    InsufficientInstances(usize),
    /// The task selection produced no candidates.
    NoTaskSelected(String),
    /// The operator declined a confirmation.
    Aborted(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Provider(msg) => write!(f, "provider: {msg}"),
            Self::Provisioning(msg) => write!(f, "provisioning: {msg}"),
            Self::KeypairInconsistent {
                name,
                remote,
                local,
            } => write!(
                f,
                "keypair inconsistent: {name} (remote: {remote}, local: {local}); run `skipper shell purgekeypair`"
            ),
            Self::JoinTimeout(msg) => write!(f, "join timeout: {msg}"),
            Self::AmbiguousJoin(msg) => write!(f, "ambiguous join: {msg}"),
            Self::TaskLaunch(msg) => write!(f, "task launch: {msg}"),
            Self::TaskStartTimeout(msg) => write!(f, "task start timeout: {msg}"),
            Self::Tunnel(msg) => write!(f, "tunnel: {msg}"),
            Self::ContainerNotFound(msg) => write!(f, "container not found: {msg}"),
            Self::Exec(msg) => write!(f, "exec: {msg}"),
            Self::OwnershipViolation(msg) => write!(f, "ownership violation: {msg}"),
            Self::PollTimeout { retired, remaining } => write!(
                f,
                "poll timeout: {retired} task(s) retired, {remaining} still pending"
            ),
            Self::InsufficientInstances(count) => write!(
                f,
                "insufficient instances: {count} running, rotating restart needs at least 2; use --terminate instead"
            ),
            Self::NoTaskSelected(msg) => write!(f, "no task selected: {msg}"),
            Self::Aborted(msg) => write!(f, "aborted: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Provider(format!("unexpected response: {err}"))
    }
}
