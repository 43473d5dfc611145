//! Remote shell seam: tunnel to a host, then exec into a task.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::GlobalConfig;
use crate::exec::{exec_in_task, DockerControlSocket};
use crate::terminal::TerminalInput;
use crate::tunnel::{SshTarget, TunnelBridge};
use crate::Result;

/// An established connection to a debug host.
pub trait ShellConnection: Send {
    /// Run the interactive command inside `task_arn`'s container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ContainerNotFound` or `AppError::Exec`.
    fn exec<'a>(&'a mut self, task_arn: &'a str) -> BoxFuture<'a, Result<i64>>;

    /// Release the connection.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Connects to debug hosts.
pub trait RemoteShell: Send + Sync {
    /// Connect to `host`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tunnel` if the host cannot be reached.
    fn connect<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Box<dyn ShellConnection>>>;
}

/// SSH tunnel to the host's Docker socket plus a Docker exec.
#[derive(Debug, Clone)]
pub struct SshDockerShell {
    user: String,
    port: u16,
    timeout: Duration,
    remote_socket: String,
    key_path: PathBuf,
    task_label: String,
    command: Vec<String>,
    input: TerminalInput,
}

impl SshDockerShell {
    /// Build from configuration and the private key location. Execs read
    /// operator input from `input`.
    #[must_use]
    pub fn new(config: &GlobalConfig, key_path: PathBuf, input: TerminalInput) -> Self {
        Self {
            user: config.ssh.user.clone(),
            port: config.ssh.port,
            timeout: config.ssh_timeout(),
            remote_socket: config.ssh.remote_socket.clone(),
            key_path,
            task_label: config.exec.task_label.clone(),
            command: config.exec.command.clone(),
            input,
        }
    }
}

struct DockerConnection {
    bridge: TunnelBridge,
    task_label: String,
    command: Vec<String>,
    input: TerminalInput,
}

impl ShellConnection for DockerConnection {
    fn exec<'a>(&'a mut self, task_arn: &'a str) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move {
            let socket = DockerControlSocket::connect(self.bridge.socket_path(), self.input.clone())?;
            exec_in_task(&socket, &self.task_label, task_arn, &self.command).await
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.bridge.close().await })
    }
}

impl RemoteShell for SshDockerShell {
    fn connect<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Box<dyn ShellConnection>>> {
        Box::pin(async move {
            let target = SshTarget {
                host,
                port: self.port,
                user: &self.user,
                key_path: &self.key_path,
                timeout: self.timeout,
            };
            let bridge =
                TunnelBridge::open(&target, &self.remote_socket, CancellationToken::new()).await?;
            let connection: Box<dyn ShellConnection> = Box::new(DockerConnection {
                bridge,
                task_label: self.task_label.clone(),
                command: self.command.clone(),
                input: self.input.clone(),
            });
            Ok(connection)
        })
    }
}
