// ABOUTME: Put command implementation.
// ABOUTME: Uploads files into a recreated remote directory and optionally runs commands there.

use super::disconnect;
use sshrelay::config::SshConfig;
use sshrelay::diagnostics::{Diagnostics, Warning};
use sshrelay::error::{Error, Result};
use sshrelay::output::Output;
use sshrelay::ssh::{Command, Session, StagingDir};
use std::path::PathBuf;

/// Upload `files` into `remote_dir`, then run `run` inside it.
pub async fn put_files(
    config: SshConfig,
    files: Vec<PathBuf>,
    remote_dir: String,
    run: Vec<String>,
    cleanup: bool,
    mut output: Output,
) -> Result<()> {
    // Fail before connecting when a source is missing.
    for file in &files {
        if !file.is_file() {
            return Err(sshrelay::ssh::Error::FileNotFound(file.clone()).into());
        }
    }

    output.start_timer();
    let mut diag = Diagnostics::default();

    output.progress(&format!("  → Connecting to {}...", config.host()));
    let session = Session::connect(config.session_config()).await?;

    let result = stage_and_run(&session, &files, &remote_dir, run, cleanup, &output, &mut diag).await;

    disconnect(&session, &mut diag).await;

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let code = result?;
    if code != 0 {
        return Err(Error::CommandExit { code });
    }

    output.success(&format!(
        "Uploaded {} file(s) to {}",
        files.len(),
        remote_dir
    ));
    Ok(())
}

/// Returns the exit code of the follow-up commands, 0 when none were given.
///
/// With `cleanup`, the staging directory is removed whether or not the
/// upload and commands succeeded.
async fn stage_and_run(
    session: &Session,
    files: &[PathBuf],
    remote_dir: &str,
    run: Vec<String>,
    cleanup: bool,
    output: &Output,
    diag: &mut Diagnostics,
) -> Result<u32> {
    output.progress(&format!("  → Preparing {}...", remote_dir));
    let staging = StagingDir::create(session, remote_dir, output).await?;

    let result = upload_and_run(session, &staging, files, run, output).await;

    if cleanup {
        let path = staging.path().to_string();
        if let Err(e) = staging.remove(output).await {
            diag.warn(Warning::staging_cleanup(format!(
                "failed to remove {}: {}",
                path, e
            )));
        }
    }

    result
}

async fn upload_and_run(
    session: &Session,
    staging: &StagingDir<'_>,
    files: &[PathBuf],
    run: Vec<String>,
    output: &Output,
) -> Result<u32> {
    staging.upload(files, output).await?;

    if run.is_empty() {
        return Ok(0);
    }

    let mut lines = vec![format!("cd {}", sshrelay::ssh::shell_quote(staging.path()))];
    lines.extend(run);
    let result = session.exec_command(Command::from(lines), output).await?;
    Ok(result.exit_code)
}
