// ABOUTME: Command module aggregator for the sshrelay CLI.
// ABOUTME: Re-exports exec, put, forward, and shell command handlers.

mod exec;
mod forward;
mod put;
mod shell;

pub use exec::exec_command;
pub use forward::forward_port;
pub use put::put_files;
pub use shell::open_shell;

use sshrelay::diagnostics::{Diagnostics, Warning};
use sshrelay::ssh::Session;

/// Disconnect a session, recording a failure as a warning.
async fn disconnect(session: &Session, diag: &mut Diagnostics) {
    if let Err(e) = session.close().await {
        diag.warn(Warning::ssh_disconnect(format!(
            "SSH disconnect failed for {}: {}",
            session.config().host,
            e
        )));
    }
}
