//! Local Unix-domain endpoint that forwards every accepted connection.
//!
//! The listener lives in a fresh temporary directory. For each accepted
//! connection a new remote channel is opened through a [`ChannelOpener`] and
//! the two are joined by a [`relay`](super::relay::relay) pair. Failing to
//! open one channel closes only that connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use interprocess::local_socket::{tokio::prelude::*, GenericFilePath, ListenerOptions};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::relay::relay;
use crate::{AppError, Result};

/// Byte stream carried by one forwarded channel.
pub trait ChannelStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ChannelStream for T {}

/// Boxed forwarded channel.
pub type BoxedChannel = Box<dyn ChannelStream>;

/// Opens one remote channel per local connection.
pub trait ChannelOpener: Send + Sync {
    /// Open a new channel to the remote endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tunnel` if the remote side refuses the channel.
    fn open_channel(&self) -> BoxFuture<'_, Result<BoxedChannel>>;
}

/// Running local endpoint. Dropping it stops the accept loop, cancels every
/// relay pair, and removes the socket directory.
pub struct Tunnel {
    socket_path: PathBuf,
    ct: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
    _dir: TempDir,
}

impl Tunnel {
    /// Bind a fresh local endpoint and start accepting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tunnel` if the directory or listener cannot be
    /// created.
    pub fn spawn(opener: Arc<dyn ChannelOpener>, ct: CancellationToken) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("skipper-")
            .tempdir()
            .map_err(|err| AppError::Tunnel(format!("failed to create socket dir: {err}")))?;
        let socket_path = dir.path().join("docker.sock");

        let name = socket_path
            .as_path()
            .to_fs_name::<GenericFilePath>()
            .map_err(|err| {
                AppError::Tunnel(format!(
                    "invalid socket path '{}': {err}",
                    socket_path.display()
                ))
            })?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .map_err(|err| AppError::Tunnel(format!("failed to create local listener: {err}")))?;

        info!(path = %socket_path.display(), "tunnel listening");

        let loop_ct = ct.clone();
        let span = info_span!("tunnel", path = %socket_path.display());
        let accept_task = tokio::spawn(
            async move {
                let mut next_id: u64 = 0;
                loop {
                    tokio::select! {
                        () = loop_ct.cancelled() => {
                            info!("tunnel shutting down");
                            break;
                        }
                        accepted = listener.accept() => {
                            match accepted {
                                Ok(stream) => {
                                    next_id += 1;
                                    let opener = Arc::clone(&opener);
                                    tokio::spawn(handle_connection(
                                        next_id,
                                        stream,
                                        opener,
                                        loop_ct.child_token(),
                                    ));
                                }
                                Err(err) => warn!(%err, "tunnel accept failed"),
                            }
                        }
                    }
                }
            }
            .instrument(span),
        );

        Ok(Self {
            socket_path,
            ct,
            accept_task: Some(accept_task),
            _dir: dir,
        })
    }

    /// Path of the local endpoint.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting and close every relay pair.
    pub async fn shutdown(mut self) {
        self.ct.cancel();
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

async fn handle_connection<S>(
    id: u64,
    stream: S,
    opener: Arc<dyn ChannelOpener>,
    ct: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let span = info_span!("tunnel_conn", id);
    async move {
        let channel = tokio::select! {
            () = ct.cancelled() => return,
            opened = opener.open_channel() => opened,
        };

        let channel = match channel {
            Ok(channel) => channel,
            Err(err) => {
                warn!(%err, "failed to open forwarded channel, closing connection");
                return;
            }
        };

        debug!("relay started");
        let report = relay(stream, channel, ct).await;
        match report.error {
            Some(ref err) => warn!(
                err,
                sent = report.local_to_remote,
                received = report.remote_to_local,
                "relay closed with error"
            ),
            None => debug!(
                sent = report.local_to_remote,
                received = report.remote_to_local,
                "relay closed"
            ),
        }
    }
    .instrument(span)
    .await;
}
