// ABOUTME: Remote staging directories for uploading files before running commands on them.
// ABOUTME: Recreates the directory, uploads over SFTP, and removes it when done.

use super::client::Session;
use super::error::{Error, Result};
use super::sftp::{SftpSession, join_remote_path};
use crate::output::Output;
use std::path::Path;

/// A freshly created directory on the remote host.
#[derive(Debug)]
pub struct StagingDir<'a> {
    session: &'a Session,
    remote_dir: String,
}

impl<'a> StagingDir<'a> {
    /// Remove any previous contents and create `remote_dir`.
    pub async fn create(session: &'a Session, remote_dir: &str, output: &Output) -> Result<Self> {
        let quoted = shell_quote(remote_dir);
        session
            .exec_command(
                vec![format!("rm -rf {}", quoted), format!("mkdir -p {}", quoted)],
                output,
            )
            .await?
            .check()?;

        Ok(Self {
            session,
            remote_dir: remote_dir.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.remote_dir
    }

    /// Remote path of a staged file.
    pub fn remote_path(&self, file_name: &str) -> String {
        join_remote_path(&self.remote_dir, file_name)
    }

    /// Upload files into the directory, keeping their file names.
    /// Returns the remote paths in the order given.
    pub async fn upload<P: AsRef<Path>>(&self, files: &[P], output: &Output) -> Result<Vec<String>> {
        let mut sftp = SftpSession::open(self.session).await?;
        let result = self.upload_with(&mut sftp, files, output).await;

        if let Err(e) = sftp.close().await {
            tracing::warn!("failed to close SFTP session: {}", e);
        }
        result
    }

    async fn upload_with<P: AsRef<Path>>(
        &self,
        sftp: &mut SftpSession<'_>,
        files: &[P],
        output: &Output,
    ) -> Result<Vec<String>> {
        sftp.chdir(&self.remote_dir).await?;

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            let file = file.as_ref();
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| Error::FileNotFound(file.to_path_buf()))?;

            output.progress(&format!("  → Uploading {}", file.display()));
            sftp.put(file, file_name).await?;
            uploaded.push(self.remote_path(file_name));
        }
        Ok(uploaded)
    }

    /// Delete the directory and everything in it.
    pub async fn remove(self, output: &Output) -> Result<()> {
        self.session
            .exec_command(format!("rm -rf {}", shell_quote(&self.remote_dir)), output)
            .await?;
        Ok(())
    }
}

/// Quote a value for a POSIX shell, leaving simple words untouched.
pub fn shell_quote(value: &str) -> String {
    let simple = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-~+=:@%,".contains(c));
    if simple {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
