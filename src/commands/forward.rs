// ABOUTME: Forward command implementation.
// ABOUTME: Forwards a local port through the SSH session until Ctrl-C.

use super::disconnect;
use sshrelay::config::SshConfig;
use sshrelay::diagnostics::{Diagnostics, Warning};
use sshrelay::error::Result;
use sshrelay::output::Output;
use sshrelay::ssh::{ForwardSpec, PortForwardProxy, Session};
use std::sync::Arc;

/// Forward `127.0.0.1:local_port` to `remote_host:remote_port` as seen from
/// the SSH server. The local port defaults to the remote port.
pub async fn forward_port(
    config: SshConfig,
    remote_host: String,
    remote_port: u16,
    local_port: Option<u16>,
    output: Output,
) -> Result<()> {
    let mut diag = Diagnostics::default();

    output.progress(&format!("  → Connecting to {}...", config.host()));
    let session = Arc::new(Session::connect(config.session_config()).await?);

    let spec = ForwardSpec::new(
        local_port.unwrap_or(remote_port),
        remote_host.as_str(),
        remote_port,
    );
    let mut proxy = PortForwardProxy::new(Arc::clone(&session), spec);

    let result = serve(&mut proxy, &remote_host, remote_port, &output).await;

    let stats = proxy.stats();
    if stats.failed_connections > 0 {
        diag.warn(Warning::forward_shutdown(format!(
            "{} of {} connection(s) could not reach {}:{}",
            stats.failed_connections, stats.connections_accepted, remote_host, remote_port
        )));
    }
    tracing::debug!(
        "forwarded {} bytes out, {} bytes back",
        stats.bytes_sent,
        stats.bytes_received
    );

    drop(proxy);
    disconnect(&session, &mut diag).await;

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    result
}

async fn serve(
    proxy: &mut PortForwardProxy<Session>,
    remote_host: &str,
    remote_port: u16,
    output: &Output,
) -> Result<()> {
    let local_addr = proxy.start().await?;
    output.success(&format!(
        "Forwarding {} to {}:{} (Ctrl-C to stop)",
        local_addr, remote_host, remote_port
    ));
    proxy.run_until_ctrl_c().await?;
    Ok(())
}
