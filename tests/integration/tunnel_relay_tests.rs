//! Integration tests for the byte relay and the local tunnel endpoint.
//!
//! Relays are exercised over in-memory duplex pipes; the endpoint tests
//! connect real Unix sockets to a tunnel backed by an in-process echo
//! channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

use skipper::tunnel::{relay, BoxedChannel, ChannelOpener, Tunnel};
use skipper::{AppError, Result};

const WAIT: Duration = Duration::from_secs(5);

// ── Relay ────────────────────────────────────────────────────

#[tokio::test]
async fn relay_moves_bytes_both_ways_and_closes_together() {
    let (mut client, local) = duplex(64);
    let (remote, mut server) = duplex(64);
    let ct = CancellationToken::new();
    let pair = tokio::spawn(relay(local, remote, ct.clone()));

    client.write_all(b"ping").await.unwrap();
    let mut buf = [0_u8; 4];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    server.write_all(b"pong!").await.unwrap();
    let mut buf = [0_u8; 5];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong!");

    drop(client);
    let report = tokio::time::timeout(WAIT, pair).await.unwrap().unwrap();
    assert_eq!(report.local_to_remote, 4);
    assert_eq!(report.remote_to_local, 5);
    assert!(report.error.is_none());
    assert!(ct.is_cancelled());

    let mut rest = Vec::new();
    server.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn relay_delivers_everything_written_before_eof() {
    let (mut client, local) = duplex(1024);
    let (remote, mut server) = duplex(1024);
    let pair = tokio::spawn(relay(local, remote, CancellationToken::new()));

    let payload: Vec<u8> = (0..65_536_u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
    let expected = payload.clone();
    let writer = tokio::spawn(async move {
        client.write_all(&payload).await.unwrap();
        client.shutdown().await.unwrap();
        client
    });

    let mut received = Vec::new();
    tokio::time::timeout(WAIT, server.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, expected);

    drop(writer.await.unwrap());
    let report = tokio::time::timeout(WAIT, pair).await.unwrap().unwrap();
    assert_eq!(report.local_to_remote, 65_536);
}

#[tokio::test]
async fn failed_pair_leaves_other_pairs_running() {
    let (mut client_a, local_a) = duplex(64);
    let (remote_a, server_a) = duplex(64);
    let (mut client_b, local_b) = duplex(64);
    let (remote_b, mut server_b) = duplex(64);

    let parent = CancellationToken::new();
    let pair_a = tokio::spawn(relay(local_a, remote_a, parent.child_token()));
    let pair_b = tokio::spawn(relay(local_b, remote_b, parent.child_token()));

    drop(server_a);
    tokio::time::timeout(WAIT, pair_a).await.unwrap().unwrap();
    let mut buf = Vec::new();
    client_a.read_to_end(&mut buf).await.unwrap();
    assert!(buf.is_empty());

    client_b.write_all(b"still here").await.unwrap();
    let mut buf = [0_u8; 10];
    server_b.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"still here");
    assert!(!pair_b.is_finished());

    parent.cancel();
    tokio::time::timeout(WAIT, pair_b).await.unwrap().unwrap();
}

#[tokio::test]
async fn cancellation_stops_an_idle_pair() {
    let (_client, local) = duplex(64);
    let (remote, _server) = duplex(64);
    let ct = CancellationToken::new();
    let pair = tokio::spawn(relay(local, remote, ct.clone()));

    ct.cancel();
    let report = tokio::time::timeout(WAIT, pair).await.unwrap().unwrap();
    assert_eq!(report.local_to_remote, 0);
    assert_eq!(report.remote_to_local, 0);
}

// ── Local endpoint ───────────────────────────────────────────

/// Opens in-memory channels answered by an echo task.
#[derive(Default)]
struct EchoOpener {
    calls: AtomicUsize,
    refuse_first: bool,
    stall_first: bool,
}

async fn echo(mut stream: DuplexStream) {
    let mut buf = [0_u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
}

impl ChannelOpener for EchoOpener {
    fn open_channel(&self) -> BoxFuture<'_, Result<BoxedChannel>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.refuse_first && call == 1 {
                return Err(AppError::Tunnel("channel refused".into()));
            }
            if self.stall_first && call == 1 {
                std::future::pending::<()>().await;
            }
            let (ours, theirs) = duplex(1024);
            tokio::spawn(echo(theirs));
            let channel: BoxedChannel = Box::new(ours);
            Ok(channel)
        })
    }
}

#[cfg(unix)]
async fn round_trip(tunnel: &Tunnel, message: &[u8]) -> Vec<u8> {
    let mut stream = tokio::net::UnixStream::connect(tunnel.socket_path())
        .await
        .expect("connect");
    stream.write_all(message).await.unwrap();
    let mut buf = vec![0_u8; message.len()];
    tokio::time::timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    buf
}

#[cfg(unix)]
#[tokio::test]
async fn tunnel_forwards_each_connection_over_its_own_channel() {
    let opener = Arc::new(EchoOpener::default());
    let tunnel = Tunnel::spawn(Arc::clone(&opener) as Arc<dyn ChannelOpener>, CancellationToken::new())
        .expect("tunnel");
    assert!(tunnel.socket_path().ends_with("docker.sock"));

    assert_eq!(round_trip(&tunnel, b"first").await, b"first");
    assert_eq!(round_trip(&tunnel, b"second").await, b"second");
    assert_eq!(opener.calls.load(Ordering::SeqCst), 2);

    tunnel.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn refused_channel_closes_only_its_connection() {
    let opener = Arc::new(EchoOpener {
        refuse_first: true,
        ..EchoOpener::default()
    });
    let tunnel = Tunnel::spawn(Arc::clone(&opener) as Arc<dyn ChannelOpener>, CancellationToken::new())
        .expect("tunnel");

    let mut refused = tokio::net::UnixStream::connect(tunnel.socket_path())
        .await
        .expect("connect");
    let mut buf = Vec::new();
    tokio::time::timeout(WAIT, refused.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert!(buf.is_empty());

    assert_eq!(round_trip(&tunnel, b"after").await, b"after");
    tunnel.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn stalled_channel_open_does_not_block_other_connections() {
    let opener = Arc::new(EchoOpener {
        stall_first: true,
        ..EchoOpener::default()
    });
    let tunnel = Tunnel::spawn(Arc::clone(&opener) as Arc<dyn ChannelOpener>, CancellationToken::new())
        .expect("tunnel");

    let _stalled = tokio::net::UnixStream::connect(tunnel.socket_path())
        .await
        .expect("connect");
    tokio::time::timeout(WAIT, async {
        while opener.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(round_trip(&tunnel, b"unblocked").await, b"unblocked");
    assert_eq!(opener.calls.load(Ordering::SeqCst), 2);

    tokio::time::timeout(WAIT, tunnel.shutdown()).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn shutdown_removes_the_socket_directory() {
    let tunnel = Tunnel::spawn(Arc::new(EchoOpener::default()), CancellationToken::new())
        .expect("tunnel");
    let path = tunnel.socket_path().to_path_buf();
    assert!(path.exists());

    tunnel.shutdown().await;

    assert!(!path.exists());
    assert!(tokio::net::UnixStream::connect(&path).await.is_err());
}
