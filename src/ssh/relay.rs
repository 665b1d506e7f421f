// ABOUTME: Bidirectional byte relay between a local client and a tunnel stream.
// ABOUTME: Stops on the first orderly close from either side and shuts down both.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest single read forwarded in one step.
pub const RELAY_CHUNK_SIZE: usize = 64 * 1024;

/// Bytes moved by one relay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Local client to remote.
    pub bytes_sent: u64,
    /// Remote to local client.
    pub bytes_received: u64,
}

/// Copy bytes between `local` and `remote` until either side closes.
///
/// Bytes within one direction are written in the order they were read. On
/// return both streams have been shut down. I/O errors end the relay and are
/// returned together with the bytes moved so far.
pub async fn relay<L, R>(mut local: L, mut remote: R) -> (RelayStats, std::io::Result<()>)
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let mut local_buf = vec![0u8; RELAY_CHUNK_SIZE];
    let mut remote_buf = vec![0u8; RELAY_CHUNK_SIZE];
    let mut stats = RelayStats::default();

    let result = loop {
        tokio::select! {
            r = local.read(&mut local_buf) => {
                match r {
                    Ok(0) => break Ok(()),
                    Ok(n) => {
                        if let Err(e) = remote.write_all(&local_buf[..n]).await {
                            break Err(e);
                        }
                        stats.bytes_sent += n as u64;
                        tracing::trace!("{} bytes sent", n);
                    }
                    Err(e) => break Err(e),
                }
            }

            r = remote.read(&mut remote_buf) => {
                match r {
                    Ok(0) => break Ok(()),
                    Ok(n) => {
                        if let Err(e) = local.write_all(&remote_buf[..n]).await {
                            break Err(e);
                        }
                        stats.bytes_received += n as u64;
                        tracing::trace!("{} bytes received", n);
                    }
                    Err(e) => break Err(e),
                }
            }
        }
    };

    let _ = remote.shutdown().await;
    let _ = local.shutdown().await;

    (stats, result)
}
