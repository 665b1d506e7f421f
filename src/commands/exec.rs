// ABOUTME: Exec command implementation.
// ABOUTME: Runs a command sequence on the remote host and propagates its exit code.

use super::disconnect;
use sshrelay::config::SshConfig;
use sshrelay::diagnostics::Diagnostics;
use sshrelay::error::{Error, Result};
use sshrelay::output::Output;
use sshrelay::ssh::{Command, Session};

/// Execute commands on the configured host, one remote line per argument.
pub async fn exec_command(config: SshConfig, command: Vec<String>, output: Output) -> Result<()> {
    let mut diag = Diagnostics::default();

    output.progress(&format!("  → Connecting to {}...", config.host()));
    let session = Session::connect(config.session_config()).await?;

    let result = session.exec_command(Command::from(command), &output).await;

    disconnect(&session, &mut diag).await;

    // Emit collected warnings
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let result = result?;
    if !result.success() {
        return Err(Error::CommandExit {
            code: result.exit_code,
        });
    }
    Ok(())
}
