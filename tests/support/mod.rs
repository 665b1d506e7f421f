// ABOUTME: Test support utilities.
// ABOUTME: Provides tracing setup, loopback tunnel doubles, and the SSH container helper.

use async_trait::async_trait;
use parking_lot::Mutex;
use sshrelay::ssh::{Error, Result, Tunnel};
use std::net::SocketAddr;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

// Each test binary only uses some of these modules, so allow dead_code.
#[allow(dead_code)]
pub mod ssh_container;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("sshrelay=debug".parse().unwrap())
            .add_directive("russh=info".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Start a TCP server on an ephemeral port that echoes every byte back.
#[allow(dead_code)]
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });

    addr
}

/// A tunnel that connects straight to a local TCP address instead of going
/// through an SSH server.
#[allow(dead_code)]
pub struct LoopbackTunnel {
    target: SocketAddr,
    fail_next: AtomicUsize,
    opened: Mutex<Vec<(String, u16, SocketAddr)>>,
}

#[allow(dead_code)]
impl LoopbackTunnel {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            fail_next: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `count` opens fail like a refused direct-tcpip channel.
    pub fn failing_first(target: SocketAddr, count: usize) -> Self {
        let tunnel = Self::new(target);
        tunnel.fail_next.store(count, Ordering::SeqCst);
        tunnel
    }

    /// Every open request seen so far: remote host, remote port, originator.
    pub fn opened(&self) -> Vec<(String, u16, SocketAddr)> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl Tunnel for LoopbackTunnel {
    type Stream = TcpStream;

    async fn open_tunnel(
        &self,
        remote_host: &str,
        remote_port: u16,
        originator: SocketAddr,
    ) -> Result<Self::Stream> {
        self.opened
            .lock()
            .push((remote_host.to_string(), remote_port, originator));

        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::ChannelOpen {
                host: remote_host.to_string(),
                port: remote_port,
                reason: "administratively prohibited".to_string(),
            });
        }

        Ok(TcpStream::connect(self.target).await?)
    }
}
