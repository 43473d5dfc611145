//! Bidirectional byte relay for one tunneled connection.
//!
//! Two tasks copy bytes in opposite directions and share a connection-scoped
//! [`CancellationToken`]. Whichever task finishes first, on EOF or error,
//! cancels its sibling so the pair always closes together.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const BUF_SIZE: usize = 16 * 1024;

/// What one relay pair moved before closing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Bytes copied from the local side to the remote side.
    pub local_to_remote: u64,
    /// Bytes copied from the remote side to the local side.
    pub remote_to_local: u64,
    /// First I/O error observed, if any.
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Leg {
    bytes: u64,
    error: Option<String>,
}

/// Relay bytes between `local` and `remote` until either side ends.
///
/// Cancelling `ct` stops both directions. The returned report is complete
/// once both tasks have exited.
pub async fn relay<L, R>(local: L, remote: R, ct: CancellationToken) -> RelayReport
where
    L: AsyncRead + AsyncWrite + Send + 'static,
    R: AsyncRead + AsyncWrite + Send + 'static,
{
    let (local_rd, local_wr) = tokio::io::split(local);
    let (remote_rd, remote_wr) = tokio::io::split(remote);

    let outbound = tokio::spawn(copy_leg(local_rd, remote_wr, ct.clone(), "local->remote"));
    let inbound = tokio::spawn(copy_leg(remote_rd, local_wr, ct.clone(), "remote->local"));

    let (out_leg, in_leg) = tokio::join!(outbound, inbound);
    let out_leg = out_leg.unwrap_or_else(|err| Leg {
        bytes: 0,
        error: Some(format!("relay task failed: {err}")),
    });
    let in_leg = in_leg.unwrap_or_else(|err| Leg {
        bytes: 0,
        error: Some(format!("relay task failed: {err}")),
    });

    RelayReport {
        local_to_remote: out_leg.bytes,
        remote_to_local: in_leg.bytes,
        error: out_leg.error.or(in_leg.error),
    }
}

async fn copy_leg<Rd, Wr>(
    mut reader: Rd,
    mut writer: Wr,
    ct: CancellationToken,
    direction: &'static str,
) -> Leg
where
    Rd: AsyncRead + Unpin,
    Wr: AsyncWrite + Unpin,
{
    let mut leg = Leg::default();
    let mut buf = vec![0_u8; BUF_SIZE];

    loop {
        let read = tokio::select! {
            () = ct.cancelled() => break,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!(direction, bytes = leg.bytes, "eof");
                break;
            }
            Ok(n) => {
                if let Err(err) = writer.write_all(&buf[..n]).await {
                    warn!(direction, %err, "relay write failed");
                    leg.error = Some(format!("{direction}: {err}"));
                    break;
                }
                if let Err(err) = writer.flush().await {
                    warn!(direction, %err, "relay flush failed");
                    leg.error = Some(format!("{direction}: {err}"));
                    break;
                }
                leg.bytes += n as u64;
            }
            Err(err) => {
                warn!(direction, %err, "relay read failed");
                leg.error = Some(format!("{direction}: {err}"));
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    ct.cancel();
    leg
}
