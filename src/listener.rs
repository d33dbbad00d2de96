//! TCP listener and per-connection reader/writer tasks (§5 "Rust
//! realization"): the only true OS concurrency in the process. Each
//! connection gets a reader task (forwards raw bytes to the gateway) and a
//! writer task (polls the gateway for queued output and writes it out);
//! neither touches core state directly — [`Connection`] line-splitting and
//! queue draining stay inside the gateway task.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::connection::Connection;
use crate::dns::DnsResolver;
use crate::gateway::GatewayCommand;
use crate::pool::Handle;

const READ_CHUNK: usize = 4096;
const DEFAULT_SENDQ_LIMIT: usize = 1 << 20;
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The bootstrap/testing peer address assigned to the `-t` stdio client
/// (§6 CLI surface); there is no real socket, so no real peer.
const STDIO_PEER_ADDR: &str = "0.0.0.0:0";

/// Binds `addr` and spawns one accept loop; each accepted socket gets its
/// own reader/writer task pair. `gateway_tx` is the single channel every
/// connection on this listener feeds into.
pub async fn run_listener(
    addr: SocketAddr,
    gateway_tx: mpsc::Sender<GatewayCommand>,
    dns: DnsResolver,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    loop {
        let (socket, peer_addr) = listener.accept().await?;
        let gateway_tx = gateway_tx.clone();
        let dns = dns.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, peer_addr, gateway_tx, dns).await {
                warn!(%peer_addr, error = %err, "connection task ended with error");
            }
        });
    }
}

/// Registers the connection with the gateway, spawns a sibling task to
/// resolve the peer's reverse-DNS hostname (§5 "suspension points": this is
/// the DNS collaborator's re-entry with a result), then runs the reader loop
/// on this task while the writer runs on another spawned sibling; returns
/// once the socket is gone.
async fn handle_connection(
    socket: TcpStream,
    peer_addr: SocketAddr,
    gateway_tx: mpsc::Sender<GatewayCommand>,
    dns: DnsResolver,
) -> std::io::Result<()> {
    socket.set_nodelay(true).ok();
    let (read_half, write_half) = socket.into_split();

    let Some(handle) = register(peer_addr, &gateway_tx).await else {
        return Ok(());
    };

    let dns_gateway_tx = gateway_tx.clone();
    tokio::spawn(async move {
        let host = dns.resolve(peer_addr.ip()).await.ok();
        let _ = dns_gateway_tx.send(GatewayCommand::DnsResolved { handle, host }).await;
    });

    run_connection(handle, Box::new(read_half), Box::new(write_half), peer_addr, gateway_tx).await
}

/// Runs stdin/stdout as the first connected client (`-t`, §6 CLI surface): a
/// bootstrap/testing mode with no real socket. Shares the same reader/writer
/// loops as a TCP connection by boxing stdin/stdout behind the same
/// `AsyncRead`/`AsyncWrite` trait objects, the pattern already used by the
/// teacher's own test client harness (`tests/common/client.rs`). There is no
/// real peer to reverse-resolve, so no DNS sibling task is spawned.
pub async fn run_stdio_client(gateway_tx: mpsc::Sender<GatewayCommand>) -> std::io::Result<()> {
    let peer_addr: SocketAddr = STDIO_PEER_ADDR.parse().expect("stdio peer addr is valid");
    info!(%peer_addr, "stdio client attached");
    let Some(handle) = register(peer_addr, &gateway_tx).await else {
        return Ok(());
    };
    run_connection(
        handle,
        Box::new(tokio::io::stdin()),
        Box::new(tokio::io::stdout()),
        peer_addr,
        gateway_tx,
    )
    .await
}

/// Registers a new connection with the gateway and returns the [`Handle`] it
/// was assigned, or `None` if the gateway is already gone.
async fn register(peer_addr: SocketAddr, gateway_tx: &mpsc::Sender<GatewayCommand>) -> Option<Handle<Connection>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    gateway_tx
        .send(GatewayCommand::NewConnection {
            peer_addr,
            sendq_limit: DEFAULT_SENDQ_LIMIT,
            reply: reply_tx,
        })
        .await
        .ok()?;
    reply_rx.await.ok()
}

async fn run_connection(
    handle: Handle<Connection>,
    mut read_half: Box<dyn AsyncRead + Unpin + Send>,
    write_half: Box<dyn AsyncWrite + Unpin + Send>,
    peer_addr: SocketAddr,
    gateway_tx: mpsc::Sender<GatewayCommand>,
) -> std::io::Result<()> {
    // The writer signals `shutdown_tx` once the gateway marks this
    // connection closed, so the reader's blocking `read` gets cancelled too
    // instead of lingering until the peer notices (§4.3, §5).
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let writer_gateway_tx = gateway_tx.clone();
    let writer = tokio::spawn(async move {
        writer_loop(write_half, handle, writer_gateway_tx, shutdown_tx).await;
    });

    reader_loop(&mut read_half, handle, peer_addr, gateway_tx, shutdown_rx).await;
    writer.abort();
    Ok(())
}

/// Reads raw bytes and forwards them to the gateway until EOF or error; all
/// line-splitting happens inside the gateway against the pooled
/// [`Connection`]'s receive buffer (§4.3 `consume_line`).
async fn reader_loop(
    read_half: &mut (dyn AsyncRead + Unpin + Send),
    handle: Handle<Connection>,
    peer_addr: SocketAddr,
    gateway_tx: mpsc::Sender<GatewayCommand>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        tokio::select! {
            result = read_half.read(&mut buf) => {
                let n = match result {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if gateway_tx
                    .send(GatewayCommand::Inbound { handle, bytes: buf[..n].to_vec() })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            _ = &mut shutdown_rx => break,
        }
    }
    debug_disconnect(peer_addr);
    let _ = gateway_tx.send(GatewayCommand::Disconnected { handle }).await;
}

fn debug_disconnect(peer_addr: SocketAddr) {
    tracing::debug!(%peer_addr, "reader loop ended");
}

/// Polls the gateway for queued output on a fixed interval and writes
/// whatever comes back. A fixed poll interval rather than a wakeup
/// notification keeps this task free of any shared state with the gateway;
/// the tradeoff is up to one interval's latency on outbound delivery.
async fn writer_loop(
    mut write_half: Box<dyn AsyncWrite + Unpin + Send>,
    handle: Handle<Connection>,
    gateway_tx: mpsc::Sender<GatewayCommand>,
    shutdown_tx: oneshot::Sender<()>,
) {
    let mut interval = tokio::time::interval(WRITER_POLL_INTERVAL);
    loop {
        interval.tick().await;
        let (reply_tx, reply_rx) = oneshot::channel();
        if gateway_tx.send(GatewayCommand::DrainReady { handle, reply: reply_tx }).await.is_err() {
            break;
        }
        let Ok(result) = reply_rx.await else { break };
        for chunk in result.chunks {
            if write_half.write_all(&chunk).await.is_err() {
                return;
            }
        }
        if result.closed {
            write_half.shutdown().await.ok();
            break;
        }
    }
    let _ = shutdown_tx.send(());
}
