// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, channel, forwarding, and SFTP failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("connection to {host}:{port} timed out after {after:?}")]
    Timeout {
        host: String,
        port: u16,
        after: Duration,
    },

    #[error("authentication failed for {user}@{host}: key rejected")]
    AuthenticationFailed { user: String, host: String },

    #[error("no private key configured for {user}@{host}")]
    MissingKey { user: String, host: String },

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("failed to decode private key: {0}")]
    KeyDecodeFailed(String),

    #[error("host key for {host}:{port} rejected by known_hosts policy")]
    HostKeyRejected { host: String, port: u16 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("remote command could not be started: {0}")]
    RemoteCommand(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("command `{command}` exited with code {code}")]
    NonZeroExit { command: String, code: u32 },

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("failed to open tunnel to {host}:{port}: {reason}")]
    ChannelOpen {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("local port {0} is already in use")]
    AddressInUse(u16),

    #[error("remote file operation on {path} failed: {reason}")]
    RemoteIo { path: String, reason: String },

    #[error("local file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        Error::InvalidState(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
