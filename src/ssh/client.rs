// ABOUTME: SSH session management using russh.
// ABOUTME: Handles connection, key authentication, command execution, and session lifecycle.

use super::command::{Command, CommandOutput, signal_exit_code};
use super::error::{Error, Result};
use super::known_hosts::{HostKeyVerifier, KnownHostsPolicy};
use super::staging::shell_quote;
use super::tunnel::Tunnel;
use crate::output::Output;
use async_trait::async_trait;
use parking_lot::RwLock;
use russh::client::{self, Config, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key, load_secret_key, ssh_key};
use russh::{ChannelMsg, ChannelStream, Disconnect};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for establishing an SSH session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// PEM-encoded private key. Takes precedence over `key_path`.
    pub private_key: Option<String>,
    /// Path to a private key file.
    pub key_path: Option<PathBuf>,
    /// How unknown or changed host keys are handled.
    pub known_hosts_policy: KnownHostsPolicy,
    /// Optional path to known_hosts file.
    /// If None, uses the default ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Bound on the TCP connect plus SSH handshake (default: 30 seconds).
    pub connect_timeout: Duration,
    /// Timeout for command execution (default: 5 minutes).
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            private_key: None,
            key_path: None,
            known_hosts_policy: KnownHostsPolicy::default(),
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(300), // 5 minutes
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn private_key(mut self, pem: impl Into<String>) -> Self {
        self.private_key = Some(pem.into());
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn known_hosts_policy(mut self, policy: KnownHostsPolicy) -> Self {
        self.known_hosts_policy = policy;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .field("known_hosts_policy", &self.known_hosts_policy)
            .field("known_hosts_path", &self.known_hosts_path)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connecting,
    Open,
    Failed,
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    verifier: HostKeyVerifier,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verifier.verify(server_public_key))
    }
}

struct Inner {
    state: SessionState,
    handle: Option<Arc<Handle<SshHandler>>>,
}

/// Moves a `Connecting` session to `Failed` if `open()` is cancelled.
struct ConnectingGuard<'a> {
    inner: &'a RwLock<Inner>,
}

impl ConnectingGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.write();
        if inner.state == SessionState::Connecting {
            tracing::debug!("SSH connect cancelled");
            inner.state = SessionState::Failed;
        }
    }
}

/// An SSH session owning at most one authenticated transport.
///
/// Share it as `Arc<Session>` with SFTP sessions and port-forward proxies.
/// Once closed, every derived operation fails with [`Error::InvalidState`].
pub struct Session {
    config: SessionConfig,
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl Session {
    /// Create a session in the `Closed` state without connecting.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                state: SessionState::Closed,
                handle: None,
            }),
        }
    }

    /// Create a session and open it.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let session = Self::new(config);
        session.open().await?;
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Establish the transport and authenticate.
    ///
    /// Dropping the returned future before it completes leaves the session
    /// `Failed`, so it can be opened again.
    pub async fn open(&self) -> Result<()> {
        {
            let mut inner = self.inner.write();
            match inner.state {
                SessionState::Open | SessionState::Connecting => {
                    return Err(Error::invalid_state(format!(
                        "session to {} is already {}",
                        self.config.host,
                        if inner.state == SessionState::Open {
                            "open"
                        } else {
                            "connecting"
                        }
                    )));
                }
                SessionState::Closed | SessionState::Failed => {
                    inner.state = SessionState::Connecting;
                }
            }
        }

        let guard = ConnectingGuard { inner: &self.inner };
        let result = self.establish().await;
        guard.disarm();

        match result {
            Ok(handle) => {
                let mut inner = self.inner.write();
                inner.handle = Some(Arc::new(handle));
                inner.state = SessionState::Open;
                tracing::info!(
                    "SSH session open: {}@{}:{}",
                    self.config.user,
                    self.config.host,
                    self.config.port
                );
                Ok(())
            }
            Err(e) => {
                self.inner.write().state = SessionState::Failed;
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<Handle<SshHandler>> {
        let config = &self.config;
        let key = Self::resolve_key(config)?;

        match tokio::time::timeout(config.connect_timeout, self.handshake(key)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                host: config.host.clone(),
                port: config.port,
                after: config.connect_timeout,
            }),
        }
    }

    /// TCP connect, key exchange and public key authentication.
    async fn handshake(&self, key: Arc<ssh_key::PrivateKey>) -> Result<Handle<SshHandler>> {
        let config = &self.config;

        // Keepalives instead of an inactivity timeout: idle tunnels must persist.
        let russh_config = Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        let handler = SshHandler {
            verifier: HostKeyVerifier::new(
                config.host.clone(),
                config.port,
                config.known_hosts_policy,
                config.known_hosts_path.clone(),
            ),
        };

        let connect = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        );

        let mut handle = match connect.await {
            Ok(handle) => handle,
            Err(russh::Error::UnknownKey) => {
                return Err(Error::HostKeyRejected {
                    host: config.host.clone(),
                    port: config.port,
                });
            }
            Err(e) => {
                return Err(Error::Connection {
                    host: config.host.clone(),
                    port: config.port,
                    reason: e.to_string(),
                });
            }
        };

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .map_err(Error::Protocol)?
            .flatten();

        let result = handle
            .authenticate_publickey(&config.user, PrivateKeyWithHashAlg::new(key, hash_alg))
            .await
            .map_err(Error::Protocol)?;

        if !result.success() {
            return Err(Error::AuthenticationFailed {
                user: config.user.clone(),
                host: config.host.clone(),
            });
        }

        Ok(handle)
    }

    /// Resolve the private key from PEM content or a key file.
    fn resolve_key(config: &SessionConfig) -> Result<Arc<ssh_key::PrivateKey>> {
        if let Some(pem) = &config.private_key {
            let key = decode_secret_key(pem, None)
                .map_err(|e| Error::KeyDecodeFailed(e.to_string()))?;
            return Ok(Arc::new(key));
        }

        if let Some(key_path) = &config.key_path {
            let key = load_secret_key(key_path, None).map_err(|e| Error::KeyLoadFailed {
                path: key_path.clone(),
                reason: e.to_string(),
            })?;
            return Ok(Arc::new(key));
        }

        Err(Error::MissingKey {
            user: config.user.clone(),
            host: config.host.clone(),
        })
    }

    /// Transport handle, only while open.
    fn handle(&self) -> Result<Arc<Handle<SshHandler>>> {
        let inner = self.inner.read();
        match (&inner.state, &inner.handle) {
            (SessionState::Open, Some(handle)) => Ok(Arc::clone(handle)),
            (state, _) => Err(Error::invalid_state(format!(
                "session to {} is {:?}, not open",
                self.config.host, state
            ))),
        }
    }

    pub(crate) async fn open_session_channel(&self) -> Result<russh::Channel<Msg>> {
        let handle = self.handle()?;
        handle
            .channel_open_session()
            .await
            .map_err(|e| Error::RemoteCommand(format!("failed to open channel: {}", e)))
    }

    /// Check if a file or directory exists on the remote host.
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        let output = self
            .exec(format!("test -e {} && echo exists", shell_quote(path)))
            .await?;
        Ok(output.success() && output.stdout.trim() == "exists")
    }

    /// Execute a command on the remote host without echoing it.
    ///
    /// A nonzero exit status is reported in [`CommandOutput`], not as an error.
    pub async fn exec(&self, command: impl Into<Command>) -> Result<CommandOutput> {
        self.exec_with_timeout(command, self.config.command_timeout)
            .await
    }

    /// Execute a command, echoing the command and its output.
    pub async fn exec_command(
        &self,
        command: impl Into<Command>,
        output: &Output,
    ) -> Result<CommandOutput> {
        let command = command.into();
        output.command(&command);
        let result = self.exec(command).await?;
        output.command_output(&result);
        Ok(result)
    }

    /// Execute a command with a custom timeout.
    pub async fn exec_with_timeout(
        &self,
        command: impl Into<Command>,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let command = command.into();
        match tokio::time::timeout(timeout, self.exec_inner(&command)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandTimeout(timeout)),
        }
    }

    async fn exec_inner(&self, command: &Command) -> Result<CommandOutput> {
        let mut channel = self.open_session_channel().await?;

        channel
            .exec(true, command.script())
            .await
            .map_err(|e| Error::RemoteCommand(format!("failed to exec command: {}", e)))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = 0u32;

        let mut got_exit_status = false;
        let mut got_eof = false;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        // stderr
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = exit_status;
                    got_exit_status = true;
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    tracing::debug!("remote command killed by signal {:?}", signal_name);
                    exit_code = signal_exit_code(&signal_name);
                    got_exit_status = true;
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelMsg::Eof) => {
                    got_eof = true;
                    if got_exit_status {
                        break;
                    }
                }
                Some(ChannelMsg::Close) => {
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }

        if !got_exit_status {
            return Err(Error::ChannelClosed);
        }

        Ok(CommandOutput {
            command: command.clone(),
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    /// Disconnect the session.
    ///
    /// Calling this on a session that is not open is a no-op.
    pub async fn close(&self) -> Result<()> {
        let handle = {
            let mut inner = self.inner.write();
            if inner.state != SessionState::Open {
                inner.state = SessionState::Closed;
                return Ok(());
            }
            inner.state = SessionState::Closed;
            inner.handle.take()
        };

        if let Some(handle) = handle {
            tracing::info!("closing SSH session to {}", self.config.host);
            handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
                .map_err(Error::Protocol)?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropping the last handle ends the russh connection task.
        let inner = self.inner.get_mut();
        if inner.state == SessionState::Open {
            tracing::debug!("SSH session to {} dropped while open", self.config.host);
        }
        inner.state = SessionState::Closed;
        inner.handle = None;
    }
}

#[async_trait]
impl Tunnel for Session {
    type Stream = ChannelStream<Msg>;

    async fn open_tunnel(
        &self,
        remote_host: &str,
        remote_port: u16,
        originator: SocketAddr,
    ) -> Result<Self::Stream> {
        let handle = self.handle()?;
        let channel = handle
            .channel_open_direct_tcpip(
                remote_host,
                u32::from(remote_port),
                originator.ip().to_string(),
                u32::from(originator.port()),
            )
            .await
            .map_err(|e| Error::ChannelOpen {
                host: remote_host.to_string(),
                port: remote_port,
                reason: e.to_string(),
            })?;
        Ok(channel.into_stream())
    }
}

/// Connect, run `body` with the session, then close it on every path.
///
/// The session is closed even when `body` fails; a close failure is only
/// logged so that the body's error is the one returned.
pub async fn with_session<F, Fut, T, E>(config: SessionConfig, body: F) -> std::result::Result<T, E>
where
    F: FnOnce(Arc<Session>) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<Error>,
{
    let session = Arc::new(Session::connect(config).await?);
    let result = body(Arc::clone(&session)).await;

    match session.close().await {
        Ok(()) => result,
        Err(e) if result.is_err() => {
            tracing::warn!("SSH disconnect failed after error: {}", e);
            result
        }
        Err(e) => Err(e.into()),
    }
}
