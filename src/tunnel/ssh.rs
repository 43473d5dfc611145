//! SSH transport for the tunnel.
//!
//! One authenticated connection per session; every local connection gets
//! its own `direct-streamlocal` channel to the remote control socket, opened
//! concurrently through the shared handle.
//! Host keys are accepted without pinning.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use russh::client::{self, Handle};
use russh::keys::{load_secret_key, ssh_key, PrivateKeyWithHashAlg};
use russh::Disconnect;
use tracing::{debug, info, info_span, Instrument};

use super::listener::{BoxedChannel, ChannelOpener};
use crate::{AppError, Result};

/// Client handler that trusts any host key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyHost;

impl client::Handler for AcceptAnyHost {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct SshTarget<'a> {
    /// Remote host address.
    pub host: &'a str,
    /// Administrative port.
    pub port: u16,
    /// Login user.
    pub user: &'a str,
    /// Private key file.
    pub key_path: &'a Path,
    /// Bound on connect plus authentication.
    pub timeout: Duration,
}

/// An authenticated SSH connection forwarding to one remote socket path.
pub struct SshTransport {
    handle: Handle<AcceptAnyHost>,
    host: String,
    remote_socket: String,
}

impl SshTransport {
    /// Connect and authenticate with the private key at `target.key_path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tunnel` if the key cannot be loaded, the
    /// connection or authentication fails, or the timeout elapses.
    pub async fn connect(target: &SshTarget<'_>, remote_socket: &str) -> Result<Self> {
        let span = info_span!("ssh_connect", host = target.host, port = target.port);
        async move {
            let key = load_secret_key(target.key_path, None).map_err(|err| {
                AppError::Tunnel(format!(
                    "cannot load private key {}: {err}",
                    target.key_path.display()
                ))
            })?;

            let attempt = async {
                let config = Arc::new(client::Config {
                    inactivity_timeout: None,
                    ..Default::default()
                });
                let mut handle =
                    client::connect(config, (target.host, target.port), AcceptAnyHost).await?;

                let hash = handle.best_supported_rsa_hash().await?.flatten();
                let auth = handle
                    .authenticate_publickey(
                        target.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                    )
                    .await?;
                Ok::<_, russh::Error>((handle, auth.success()))
            };

            let (handle, authenticated) = tokio::time::timeout(target.timeout, attempt)
                .await
                .map_err(|_| {
                    AppError::Tunnel(format!(
                        "connecting to {}:{} timed out after {:?}",
                        target.host, target.port, target.timeout
                    ))
                })?
                .map_err(|err| {
                    AppError::Tunnel(format!(
                        "ssh to {}:{} failed: {err}",
                        target.host, target.port
                    ))
                })?;

            if !authenticated {
                return Err(AppError::Tunnel(format!(
                    "public key authentication as {} rejected by {}",
                    target.user, target.host
                )));
            }

            info!("ssh transport established");
            Ok(Self {
                handle,
                host: target.host.to_owned(),
                remote_socket: remote_socket.to_owned(),
            })
        }
        .instrument(span)
        .await
    }

    /// Remote host this transport is connected to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Close the connection.
    pub async fn close(&self) {
        if let Err(err) = self
            .handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            debug!(%err, "ssh disconnect failed");
        }
    }
}

impl ChannelOpener for SshTransport {
    fn open_channel(&self) -> BoxFuture<'_, Result<BoxedChannel>> {
        Box::pin(async move {
            let channel = self
                .handle
                .channel_open_direct_streamlocal(self.remote_socket.as_str())
                .await
                .map_err(|err| {
                    AppError::Tunnel(format!(
                        "cannot forward to {} on {}: {err}",
                        self.remote_socket, self.host
                    ))
                })?;
            debug!(socket = self.remote_socket, "forwarded channel opened");
            let stream: BoxedChannel = Box::new(channel.into_stream());
            Ok(stream)
        })
    }
}
