// ABOUTME: TCP port forwarding through an SSH transport.
// ABOUTME: Accepts local TCP clients and relays each over its own direct-tcpip channel.

use super::error::{Error, Result};
use super::relay::relay;
use super::tunnel::Tunnel;
use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Where a proxy listens and what it forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    /// Local port to bind on 127.0.0.1; 0 lets the OS pick one.
    pub local_bind_port: u16,
    /// Host to reach from the SSH server.
    pub remote_host: String,
    /// Port on `remote_host`.
    pub remote_port: u16,
}

impl ForwardSpec {
    pub fn new(local_bind_port: u16, remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            local_bind_port,
            remote_host: remote_host.into(),
            remote_port,
        }
    }
}

/// Whether the proxy is accepting connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Listening,
}

/// Counters across all connections of one proxy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    /// Client connections accepted.
    pub connections_accepted: u64,
    /// Connections currently relaying.
    pub active_connections: u64,
    /// Connections dropped because the tunnel could not be opened.
    pub failed_connections: u64,
    /// Bytes sent to the remote side by finished relays.
    pub bytes_sent: u64,
    /// Bytes received from the remote side by finished relays.
    pub bytes_received: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    active: AtomicU64,
    failed: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ForwardStats {
        ForwardStats {
            connections_accepted: self.accepted.load(Ordering::SeqCst),
            active_connections: self.active.load(Ordering::SeqCst),
            failed_connections: self.failed.load(Ordering::SeqCst),
            bytes_sent: self.bytes_sent.load(Ordering::SeqCst),
            bytes_received: self.bytes_received.load(Ordering::SeqCst),
        }
    }
}

/// Counts a relay as active until dropped, including when it is aborted.
struct ActiveGuard<'a>(&'a Counters);

impl<'a> ActiveGuard<'a> {
    fn new(counters: &'a Counters) -> Self {
        counters.active.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How the acceptor should treat in-flight relays when it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopMode {
    /// Let relays run until their peers close.
    Graceful,
    /// Cancel every relay.
    Abort,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: Arc<Notify>,
    stop_mode: Arc<Mutex<StopMode>>,
    acceptor: JoinHandle<()>,
}

enum Lifecycle {
    Created,
    Listening(Running),
    Stopped,
}

/// A local TCP listener forwarding every accepted client through a [`Tunnel`].
///
/// Lifecycle is `Stopped -> Listening -> Stopped`; a stopped proxy cannot be
/// started again.
pub struct PortForwardProxy<T: Tunnel> {
    spec: ForwardSpec,
    tunnel: Arc<T>,
    counters: Arc<Counters>,
    lifecycle: Lifecycle,
}

impl<T: Tunnel> std::fmt::Debug for PortForwardProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortForwardProxy")
            .field("spec", &self.spec)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

impl<T: Tunnel> PortForwardProxy<T> {
    pub fn new(tunnel: Arc<T>, spec: ForwardSpec) -> Self {
        Self {
            spec,
            tunnel,
            counters: Arc::new(Counters::default()),
            lifecycle: Lifecycle::Created,
        }
    }

    pub fn spec(&self) -> &ForwardSpec {
        &self.spec
    }

    pub fn state(&self) -> ListenerState {
        match self.lifecycle {
            Lifecycle::Listening(_) => ListenerState::Listening,
            Lifecycle::Created | Lifecycle::Stopped => ListenerState::Stopped,
        }
    }

    /// Actually-bound local address, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.lifecycle {
            Lifecycle::Listening(running) => Some(running.local_addr),
            _ => None,
        }
    }

    /// Actually-bound local port, while listening.
    pub fn local_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    pub fn stats(&self) -> ForwardStats {
        self.counters.snapshot()
    }

    /// Bind the local socket and start accepting in a background task.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Listening(_) => {
                return Err(Error::invalid_state("port forward is already listening"));
            }
            Lifecycle::Stopped => {
                return Err(Error::invalid_state(
                    "port forward was stopped and cannot be restarted",
                ));
            }
        }

        let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.spec.local_bind_port));
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                Error::AddressInUse(self.spec.local_bind_port)
            } else {
                Error::Io(e)
            }
        })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            "forwarding {} to {}:{}",
            local_addr,
            self.spec.remote_host,
            self.spec.remote_port
        );

        let shutdown = Arc::new(Notify::new());
        let stop_mode = Arc::new(Mutex::new(StopMode::Graceful));

        let acceptor = tokio::spawn(run_acceptor(
            listener,
            Arc::clone(&self.tunnel),
            self.spec.clone(),
            Arc::clone(&self.counters),
            Arc::clone(&shutdown),
            Arc::clone(&stop_mode),
        ));

        self.lifecycle = Lifecycle::Listening(Running {
            local_addr,
            shutdown,
            stop_mode,
            acceptor,
        });

        Ok(local_addr)
    }

    /// Stop accepting connections. In-flight relays continue until their
    /// peers close. Stopping an already stopped proxy does nothing.
    pub async fn stop(&mut self) -> Result<()> {
        self.shut_down(StopMode::Graceful).await
    }

    /// Stop accepting connections and cancel every in-flight relay.
    pub async fn abort(&mut self) -> Result<()> {
        self.shut_down(StopMode::Abort).await
    }

    async fn shut_down(&mut self, mode: StopMode) -> Result<()> {
        if !matches!(self.lifecycle, Lifecycle::Listening(_)) {
            return Ok(());
        }
        let lifecycle = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped);
        let Lifecycle::Listening(running) = lifecycle else {
            return Ok(());
        };

        *running.stop_mode.lock() = mode;
        running.shutdown.notify_one();

        if let Err(e) = running.acceptor.await {
            tracing::warn!("port forward acceptor ended abnormally: {}", e);
        }
        tracing::info!("stopped forwarding {}", running.local_addr);
        Ok(())
    }

    /// Serve until Ctrl-C, then stop.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        if self.state() != ListenerState::Listening {
            self.start().await?;
        }
        tokio::signal::ctrl_c().await?;
        self.stop().await
    }
}

impl<T: Tunnel> Drop for PortForwardProxy<T> {
    fn drop(&mut self) {
        if let Lifecycle::Listening(running) = &self.lifecycle {
            running.shutdown.notify_one();
        }
    }
}

/// Accept loop. Returns once shutdown is signalled, dropping the listener.
async fn run_acceptor<T: Tunnel>(
    listener: TcpListener,
    tunnel: Arc<T>,
    spec: ForwardSpec,
    counters: Arc<Counters>,
    shutdown: Arc<Notify>,
    stop_mode: Arc<Mutex<StopMode>>,
) {
    let mut relays = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,

            // Reap finished relays so the set does not grow without bound.
            Some(_) = relays.join_next(), if !relays.is_empty() => {}

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        counters.accepted.fetch_add(1, Ordering::SeqCst);
                        tracing::debug!("accepted forward connection from {}", peer_addr);

                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
                        }

                        relays.spawn(forward_connection(
                            stream,
                            peer_addr,
                            Arc::clone(&tunnel),
                            spec.clone(),
                            Arc::clone(&counters),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!("Accept error on forwarded port: {}", e);
                        // Errors like EMFILE persist; back off before retrying.
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    drop(listener);

    match *stop_mode.lock() {
        StopMode::Graceful => relays.detach_all(),
        StopMode::Abort => relays.abort_all(),
    }
}

/// Forward a single client connection through its own tunnel.
async fn forward_connection<T: Tunnel>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    tunnel: Arc<T>,
    spec: ForwardSpec,
    counters: Arc<Counters>,
) {
    let channel = match tunnel
        .open_tunnel(&spec.remote_host, spec.remote_port, peer_addr)
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("dropping connection from {}: {}", peer_addr, e);
            // Dropping the stream closes the client socket.
            return;
        }
    };

    let _active = ActiveGuard::new(&counters);
    let (stats, result) = relay(stream, channel).await;

    counters
        .bytes_sent
        .fetch_add(stats.bytes_sent, Ordering::SeqCst);
    counters
        .bytes_received
        .fetch_add(stats.bytes_received, Ordering::SeqCst);

    match result {
        Ok(()) => tracing::debug!(
            "connection from {} closed: {} bytes sent, {} bytes received",
            peer_addr,
            stats.bytes_sent,
            stats.bytes_received
        ),
        Err(e) => tracing::debug!("connection from {} ended with error: {}", peer_addr, e),
    }
}
