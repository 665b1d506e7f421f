// ABOUTME: Abstraction over transports that can open TCP tunnels to a remote host:port.
// ABOUTME: Implemented by Session via direct-tcpip channels; tests substitute local doubles.

use super::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Opens byte streams to `remote_host:remote_port` on behalf of a local client.
///
/// Implementations must allow concurrent calls; the port-forward proxy opens
/// one tunnel per accepted connection without serializing them.
#[async_trait]
pub trait Tunnel: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a tunnel. `originator` is the address of the local client the
    /// tunnel is opened for.
    async fn open_tunnel(
        &self,
        remote_host: &str,
        remote_port: u16,
        originator: SocketAddr,
    ) -> Result<Self::Stream>;
}

