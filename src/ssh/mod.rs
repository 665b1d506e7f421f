// ABOUTME: SSH client module for remote instances.
// ABOUTME: Key-based sessions, command execution, SFTP, staging, and TCP port forwarding.

mod client;
mod command;
mod error;
mod forward;
mod known_hosts;
mod relay;
mod sftp;
mod staging;
mod tunnel;

pub use client::{Session, SessionConfig, SessionState, with_session};
pub use command::{Command, CommandOutput};
pub use error::{Error, Result};
pub use forward::{ForwardSpec, ForwardStats, ListenerState, PortForwardProxy};
pub use known_hosts::KnownHostsPolicy;
pub use relay::{RELAY_CHUNK_SIZE, RelayStats, relay};
pub use sftp::SftpSession;
pub use staging::{StagingDir, shell_quote};
pub use tunnel::Tunnel;
