//! Global configuration parsing, validation, and default resolution.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::{AppError, Result};

/// Name of the configuration directory under the user's home.
pub const CONFIG_DIR_NAME: &str = ".skipper";

/// System-wide configuration fallback.
const SYSTEM_CONFIG_PATH: &str = "/etc/skipper/config.toml";

/// Settings for the ephemeral debug cluster and its instances.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DebugConfig {
    /// Cluster that debug instances register into.
    pub cluster: String,
    /// Instance type for freshly provisioned debug hosts.
    pub instance_type: String,
    /// Maximum cluster-join polls before giving up.
    pub join_attempts: u32,
    /// Seconds between cluster-join polls.
    pub join_interval_seconds: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            cluster: "DEBUG".into(),
            instance_type: "t2.large".into(),
            join_attempts: 30,
            join_interval_seconds: 10,
        }
    }
}

/// SSH transport settings for the tunnel.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SshConfig {
    /// Login user on the debug host.
    pub user: String,
    /// Administrative SSH port.
    pub port: u16,
    /// Connection and authentication timeout.
    pub connect_timeout_seconds: u64,
    /// Container runtime control socket on the remote host.
    pub remote_socket: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "ec2-user".into(),
            port: 22,
            connect_timeout_seconds: 10,
            remote_socket: "/var/run/docker.sock".into(),
        }
    }
}

/// Interactive exec settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ExecConfig {
    /// Command started inside the matched container.
    pub command: Vec<String>,
    /// Container label carrying the cluster task identifier.
    pub task_label: String,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            command: vec!["/bin/sh".into()],
            task_label: "com.amazonaws.ecs.task-arn".into(),
        }
    }
}

/// Rolling restart polling bounds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct RestartConfig {
    /// Seconds between running-count polls.
    pub poll_interval_seconds: u64,
    /// Total seconds to wait for one replacement.
    pub poll_budget_seconds: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            poll_budget_seconds: 600,
        }
    }
}

/// Options passed through to the `aws` command line.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AwsConfig {
    /// Executable name or path.
    pub cli: String,
    /// Named profile (`--profile`).
    pub profile: Option<String>,
    /// Region override (`--region`).
    pub region: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            cli: "aws".into(),
            profile: None,
            region: None,
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Directory holding local state such as private keys.
    /// Defaults to `$HOME/.skipper`.
    pub config_dir: Option<PathBuf>,
    /// Debug cluster settings.
    pub debug: DebugConfig,
    /// SSH tunnel settings.
    pub ssh: SshConfig,
    /// Interactive exec settings.
    pub exec: ExecConfig,
    /// Rolling restart settings.
    pub restart: RestartConfig,
    /// AWS command line settings.
    pub aws: AwsConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration from an explicit path, the user config, the
    /// system config, or built-in defaults, in that order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a discovered file is invalid.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!(path = %path.display(), "loading configuration");
            return Self::load_from_path(path);
        }

        let candidates = home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME).join("config.toml"))
            .into_iter()
            .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG_PATH)));

        for candidate in candidates {
            if candidate.is_file() {
                info!(path = %candidate.display(), "loading configuration");
                return Self::load_from_path(candidate);
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Directory holding local state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no directory is configured and the
    /// home directory cannot be determined.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.config_dir {
            return Ok(dir.clone());
        }
        home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME))
            .ok_or_else(|| AppError::Config("cannot determine home directory".into()))
    }

    /// Directory where private keys are persisted.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::state_dir`] failures.
    pub fn key_dir(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join(".ssh"))
    }

    /// Interval between cluster-join polls.
    #[must_use]
    pub fn join_interval(&self) -> Duration {
        Duration::from_secs(self.debug.join_interval_seconds)
    }

    /// Interval between rolling restart polls.
    #[must_use]
    pub fn restart_poll_interval(&self) -> Duration {
        Duration::from_secs(self.restart.poll_interval_seconds)
    }

    /// Total wait budget for one rolling restart replacement.
    #[must_use]
    pub fn restart_poll_budget(&self) -> Duration {
        Duration::from_secs(self.restart.poll_budget_seconds)
    }

    /// SSH connect timeout.
    #[must_use]
    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.debug.cluster.trim().is_empty() {
            return Err(AppError::Config("debug.cluster must not be empty".into()));
        }

        if self.debug.join_attempts == 0 {
            return Err(AppError::Config(
                "debug.join_attempts must be greater than zero".into(),
            ));
        }

        if self.restart.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "restart.poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.restart.poll_budget_seconds < self.restart.poll_interval_seconds {
            return Err(AppError::Config(
                "restart.poll_budget_seconds must not be smaller than the poll interval".into(),
            ));
        }

        if self.exec.command.is_empty() {
            return Err(AppError::Config("exec.command must not be empty".into()));
        }

        Ok(())
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}
