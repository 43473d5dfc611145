//! Remote exec bridge over the tunneled control socket.

pub mod docker;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::models::container::{find_task_container, ContainerSummary};
use crate::terminal::TerminalInput;
use crate::{AppError, Result};

pub use docker::DockerControlSocket;

/// Container runtime client reached through the tunnel.
pub trait ControlSocket: Send + Sync {
    /// Running containers with their labels.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Exec` if the runtime cannot be queried.
    fn list_containers(&self) -> BoxFuture<'_, Result<Vec<ContainerSummary>>>;

    /// Create an interactive exec with a pseudo-terminal; returns its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Exec` if the runtime rejects the request.
    fn create_exec<'a>(
        &'a self,
        container_id: &'a str,
        command: &'a [String],
    ) -> BoxFuture<'a, Result<String>>;

    /// Attach the local terminal to an exec until it exits; returns the
    /// remote exit code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Exec` if the stream cannot be attached.
    fn attach<'a>(&'a self, exec_id: &'a str) -> BoxFuture<'a, Result<i64>>;
}

/// Run `command` interactively in the container labelled with `task_arn`.
///
/// # Errors
///
/// Returns `AppError::ContainerNotFound` if no container carries the label
/// and `AppError::Exec` if the exec cannot be created or attached.
pub async fn exec_in_task(
    socket: &dyn ControlSocket,
    task_label: &str,
    task_arn: &str,
    command: &[String],
) -> Result<i64> {
    let span = info_span!("exec", task = task_arn);
    async move {
        let containers = socket.list_containers().await?;
        let container = find_task_container(&containers, task_label, task_arn).ok_or_else(|| {
            AppError::ContainerNotFound(format!(
                "no container labelled {task_label}={task_arn} among {}",
                containers.len()
            ))
        })?;

        let exec_id = socket
            .create_exec(&container.id, command)
            .await
            .map_err(|err| match err {
                AppError::Exec(_) => err,
                other => AppError::Exec(other.to_string()),
            })?;
        info!(container = container.id, exec = exec_id, ?command, "exec created");

        let code = socket.attach(&exec_id).await?;
        info!(exit_code = code, "exec finished");
        Ok(code)
    }
    .instrument(span)
    .await
}

/// Copy operator input into an exec's stdin until input ends, the sink
/// fails, or `ct` is cancelled. Returns the number of bytes forwarded.
///
/// Input not yet taken when `ct` fires stays buffered for the next reader.
pub async fn forward_input<W>(input: &TerminalInput, sink: &mut W, ct: &CancellationToken) -> u64
where
    W: AsyncWrite + Unpin,
{
    let mut buf = [0_u8; 1024];
    let mut forwarded = 0_u64;
    loop {
        let n = tokio::select! {
            () = ct.cancelled() => break,
            n = input.read_chunk(&mut buf) => n,
        };
        if n == 0 {
            break;
        }
        if let Err(err) = sink.write_all(&buf[..n]).await {
            debug!(%err, "exec stdin closed");
            break;
        }
        if sink.flush().await.is_err() {
            break;
        }
        forwarded += n as u64;
    }
    forwarded
}
