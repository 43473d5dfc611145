//! [`ControlSocket`] backed by `bollard` over the tunnel's local endpoint.

use std::io::IsTerminal;
use std::path::Path;

use bollard::errors::Error as BollardError;
use bollard::exec::{ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::models::ExecConfig;
use bollard::query_parameters::ListContainersOptionsBuilder;
use bollard::{Docker, API_DEFAULT_VERSION};
use crossterm::terminal;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{forward_input, ControlSocket};
use crate::models::container::ContainerSummary;
use crate::terminal::TerminalInput;
use crate::{AppError, Result};

/// Request timeout for control-socket calls.
const DOCKER_TIMEOUT_SECS: u64 = 120;

fn exec_error(operation: &str, err: &BollardError) -> AppError {
    AppError::Exec(format!("{operation}: {err}"))
}

/// Puts the local terminal into raw mode for its lifetime.
struct RawMode {
    enabled: bool,
}

impl RawMode {
    fn enable() -> Self {
        if !std::io::stdin().is_terminal() {
            return Self { enabled: false };
        }
        match terminal::enable_raw_mode() {
            Ok(()) => Self { enabled: true },
            Err(err) => {
                warn!(%err, "cannot switch terminal to raw mode");
                Self { enabled: false }
            }
        }
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(err) = terminal::disable_raw_mode() {
                warn!(%err, "cannot restore terminal mode");
            }
        }
    }
}

/// Docker engine client bound to a local Unix socket path.
#[derive(Clone)]
pub struct DockerControlSocket {
    docker: Docker,
    input: TerminalInput,
}

impl DockerControlSocket {
    /// Connect to the engine listening on `socket_path`; attached execs
    /// read from `input`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Exec` if the client cannot be built.
    pub fn connect(socket_path: &Path, input: TerminalInput) -> Result<Self> {
        let path = socket_path.to_string_lossy();
        let docker = Docker::connect_with_socket(&path, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
            .map_err(|err| exec_error("connect", &err))?;
        Ok(Self { docker, input })
    }

    async fn resize_to_terminal(&self, exec_id: &str) {
        let Ok((width, height)) = terminal::size() else {
            return;
        };
        if let Err(err) = self
            .docker
            .resize_exec(exec_id, ResizeExecOptions { height, width })
            .await
        {
            debug!(%err, "exec resize failed");
        }
    }
}

impl ControlSocket for DockerControlSocket {
    fn list_containers(&self) -> BoxFuture<'_, Result<Vec<ContainerSummary>>> {
        Box::pin(async move {
            let containers = self
                .docker
                .list_containers(Some(ListContainersOptionsBuilder::new().all(false).build()))
                .await
                .map_err(|err| exec_error("list_containers", &err))?;

            Ok(containers
                .into_iter()
                .filter_map(|container| {
                    Some(ContainerSummary {
                        id: container.id?,
                        labels: container.labels.unwrap_or_default(),
                    })
                })
                .collect())
        })
    }

    fn create_exec<'a>(
        &'a self,
        container_id: &'a str,
        command: &'a [String],
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let config = ExecConfig {
                attach_stdin: Some(true),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                tty: Some(true),
                cmd: Some(command.to_vec()),
                ..ExecConfig::default()
            };
            let created = self
                .docker
                .create_exec(container_id, config)
                .await
                .map_err(|err| exec_error("create_exec", &err))?;
            Ok(created.id)
        })
    }

    fn attach<'a>(&'a self, exec_id: &'a str) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move {
            let started = self
                .docker
                .start_exec(
                    exec_id,
                    Some(StartExecOptions {
                        detach: false,
                        tty: true,
                        output_capacity: None,
                    }),
                )
                .await
                .map_err(|err| exec_error("start_exec", &err))?;

            let StartExecResults::Attached {
                mut output,
                mut input,
            } = started
            else {
                return Err(AppError::Exec("exec started detached".into()));
            };

            self.resize_to_terminal(exec_id).await;
            let raw = RawMode::enable();

            let ct = CancellationToken::new();
            let pump_ct = ct.clone();
            let terminal = self.input.clone();
            let pump = tokio::spawn(async move {
                let forwarded = forward_input(&terminal, &mut input, &pump_ct).await;
                debug!(forwarded, "exec input pump stopped");
            });

            let mut stdout = tokio::io::stdout();
            let mut failure = None;
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(log) => {
                        let bytes = log.into_bytes();
                        if let Err(err) = stdout.write_all(&bytes).await {
                            failure = Some(AppError::Exec(format!("stdout: {err}")));
                            break;
                        }
                        let _ = stdout.flush().await;
                    }
                    Err(err) => {
                        failure = Some(exec_error("attach", &err));
                        break;
                    }
                }
            }

            ct.cancel();
            let _ = pump.await;
            drop(raw);

            if let Some(err) = failure {
                return Err(err);
            }

            let inspected = self
                .docker
                .inspect_exec(exec_id)
                .await
                .map_err(|err| exec_error("inspect_exec", &err))?;
            Ok(inspected.exit_code.unwrap_or(0))
        })
    }
}
