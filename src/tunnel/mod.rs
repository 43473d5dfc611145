//! Tunnel bridge: make a remote control socket locally addressable.

pub mod listener;
pub mod relay;
pub mod ssh;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use listener::{BoxedChannel, ChannelOpener, Tunnel};
pub use relay::{relay, RelayReport};
pub use ssh::{SshTarget, SshTransport};

use crate::Result;

/// One SSH transport plus the local endpoint forwarding through it.
pub struct TunnelBridge {
    transport: Arc<SshTransport>,
    tunnel: Tunnel,
}

impl TunnelBridge {
    /// Connect to `target` and expose `remote_socket` on a local path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tunnel` if the transport or listener cannot be set
    /// up.
    pub async fn open(
        target: &SshTarget<'_>,
        remote_socket: &str,
        ct: CancellationToken,
    ) -> Result<Self> {
        let transport = Arc::new(SshTransport::connect(target, remote_socket).await?);
        let opener: Arc<dyn ChannelOpener> = Arc::clone(&transport) as Arc<dyn ChannelOpener>;
        let tunnel = Tunnel::spawn(opener, ct)?;
        Ok(Self { transport, tunnel })
    }

    /// Local endpoint clients connect to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        self.tunnel.socket_path()
    }

    /// Stop the listener and close the transport.
    pub async fn close(self) {
        self.tunnel.shutdown().await;
        self.transport.close().await;
    }
}
