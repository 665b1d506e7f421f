// ABOUTME: SFTP file transfer over an open SSH session.
// ABOUTME: Supports put, get, and a working directory for relative remote paths.

use super::client::Session;
use super::error::{Error, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// An SFTP sub-channel borrowed from a [`Session`].
///
/// The borrow keeps the SFTP session from outliving its SSH session; closing
/// the SSH session makes every operation fail with [`Error::InvalidState`].
pub struct SftpSession<'a> {
    session: &'a Session,
    sftp: Option<russh_sftp::client::SftpSession>,
    cwd: Option<String>,
}

impl std::fmt::Debug for SftpSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpSession")
            .field("host", &self.session.config().host)
            .field("open", &self.sftp.is_some())
            .field("cwd", &self.cwd)
            .finish()
    }
}

impl<'a> SftpSession<'a> {
    /// Open the SFTP subsystem on an open session.
    pub async fn open(session: &'a Session) -> Result<Self> {
        if !session.is_open() {
            return Err(Error::invalid_state(
                "cannot open SFTP on a session that is not open",
            ));
        }

        let channel = session.open_session_channel().await?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| Error::RemoteCommand(format!("failed to request sftp subsystem: {}", e)))?;

        let sftp = russh_sftp::client::SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::RemoteIo {
                path: ".".to_string(),
                reason: format!("failed to start SFTP session: {}", e),
            })?;

        tracing::debug!("SFTP session open on {}", session.config().host);

        Ok(Self {
            session,
            sftp: Some(sftp),
            cwd: None,
        })
    }

    /// Working directory set by [`chdir`](Self::chdir), if any.
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    fn sftp(&self) -> Result<&russh_sftp::client::SftpSession> {
        if !self.session.is_open() {
            return Err(Error::invalid_state("SSH session behind SFTP is closed"));
        }
        self.sftp
            .as_ref()
            .ok_or_else(|| Error::invalid_state("SFTP session is closed"))
    }

    fn resolve(&self, remote_path: &str) -> String {
        match &self.cwd {
            Some(cwd) => join_remote_path(cwd, remote_path),
            None => remote_path.to_string(),
        }
    }

    /// Change the directory that relative remote paths resolve against.
    pub async fn chdir(&mut self, remote_path: &str) -> Result<()> {
        let target = self.resolve(remote_path);
        let sftp = self.sftp()?;

        let canonical = sftp
            .canonicalize(&target)
            .await
            .map_err(|e| remote_io(&target, e))?;
        let metadata = sftp
            .metadata(&canonical)
            .await
            .map_err(|e| remote_io(&canonical, e))?;
        if !metadata.is_dir() {
            return Err(Error::RemoteIo {
                path: canonical,
                reason: "not a directory".to_string(),
            });
        }

        self.cwd = Some(canonical);
        Ok(())
    }

    /// Upload a local file. Returns the number of bytes written.
    pub async fn put(&self, local_path: impl AsRef<Path>, remote_path: &str) -> Result<u64> {
        let local_path = local_path.as_ref();
        let sftp = self.sftp()?;

        let mut local = match tokio::fs::File::open(local_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(local_path.to_path_buf()));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let target = self.resolve(remote_path);
        let mut remote = sftp
            .create(&target)
            .await
            .map_err(|e| remote_io(&target, e))?;

        let written = tokio::io::copy(&mut local, &mut remote)
            .await
            .map_err(|e| Error::RemoteIo {
                path: target.clone(),
                reason: e.to_string(),
            })?;
        remote.shutdown().await.map_err(|e| Error::RemoteIo {
            path: target.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            "uploaded {} to {} ({} bytes)",
            local_path.display(),
            target,
            written
        );
        Ok(written)
    }

    /// Download a remote file. Returns the number of bytes read.
    pub async fn get(&self, remote_path: &str, local_path: impl AsRef<Path>) -> Result<u64> {
        let local_path = local_path.as_ref();
        let sftp = self.sftp()?;

        let target = self.resolve(remote_path);
        let mut remote = sftp
            .open(&target)
            .await
            .map_err(|e| remote_io(&target, e))?;

        let mut local = tokio::fs::File::create(local_path).await?;
        let read = tokio::io::copy(&mut remote, &mut local)
            .await
            .map_err(|e| Error::RemoteIo {
                path: target.clone(),
                reason: e.to_string(),
            })?;
        local.flush().await?;

        tracing::debug!(
            "downloaded {} to {} ({} bytes)",
            target,
            local_path.display(),
            read
        );
        Ok(read)
    }

    /// Close the SFTP sub-channel. Closing twice does nothing.
    pub async fn close(&mut self) -> Result<()> {
        let Some(sftp) = self.sftp.take() else {
            return Ok(());
        };
        sftp.close().await.map_err(|e| remote_io(".", e))
    }
}

fn remote_io(path: &str, err: impl std::fmt::Display) -> Error {
    Error::RemoteIo {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

/// Join a remote path onto a base directory; absolute paths win.
pub(crate) fn join_remote_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }
    if path.is_empty() || path == "." {
        return base.to_string();
    }
    if base.is_empty() {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}
