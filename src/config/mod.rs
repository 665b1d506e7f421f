// ABOUTME: Configuration types and parsing for ssh.yml.
// ABOUTME: Handles YAML parsing, key resolution, and conversion to session settings.

mod env_value;
mod init;

pub use env_value::EnvValue;
pub use init::init_config;

use crate::error::{Error, Result};
use crate::ssh::{KnownHostsPolicy, SessionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "ssh.yml";
pub const CONFIG_FILENAME_ALT: &str = "ssh.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".sshrelay/ssh.yml";
pub const KNOWN_HOSTS_FILENAME: &str = "known_hosts";

/// On-disk shape of ssh.yml. Accepts both the short keys (`ip`, `key`,
/// `key_file`) and the descriptive ones.
#[derive(Debug, Clone, Deserialize)]
struct SshConfigFile {
    #[serde(alias = "ip")]
    host: String,

    #[serde(default = "default_port")]
    port: u16,

    user: String,

    #[serde(default, alias = "key")]
    private_key: Option<EnvValue>,

    #[serde(default, alias = "key_file")]
    private_key_path: Option<PathBuf>,

    #[serde(default)]
    known_hosts: KnownHostsPolicy,

    #[serde(default)]
    known_hosts_file: Option<PathBuf>,

    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    connect_timeout: Duration,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    command_timeout: Duration,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Connection settings for one remote instance.
///
/// Relative paths in the file (`key_file`, `known_hosts_file`) are resolved
/// against the directory holding the config, so the record is usable from any
/// working directory once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct SshConfig {
    host: String,
    port: u16,
    user: String,
    private_key: Option<String>,
    key_file: Option<PathBuf>,
    known_hosts_policy: KnownHostsPolicy,
    known_hosts_file: PathBuf,
    connect_timeout: Duration,
    command_timeout: Duration,
    config_dir: PathBuf,
}

impl std::fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("key_file", &self.key_file)
            .field("known_hosts_policy", &self.known_hosts_policy)
            .field("known_hosts_file", &self.known_hosts_file)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl SshConfig {
    /// Parse YAML, resolving relative paths against `base_dir`.
    pub fn from_yaml(yaml: &str, base_dir: &Path) -> Result<Self> {
        let file: SshConfigFile = serde_yaml::from_str(yaml)?;
        Self::from_file(file, base_dir)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&content, base_dir)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn from_file(file: SshConfigFile, base_dir: &Path) -> Result<Self> {
        if file.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".to_string()));
        }
        if file.user.trim().is_empty() {
            return Err(Error::InvalidConfig("user must not be empty".to_string()));
        }

        let private_key = file.private_key.as_ref().map(EnvValue::resolve).transpose()?;
        let key_file = file.private_key_path.map(|path| base_dir.join(path));

        if private_key.is_none() && key_file.is_none() {
            return Err(Error::InvalidConfig(
                "one of key/private_key or key_file/private_key_path is required".to_string(),
            ));
        }

        let known_hosts_file = match file.known_hosts_file {
            Some(path) => base_dir.join(path),
            None => base_dir.join(KNOWN_HOSTS_FILENAME),
        };

        Ok(Self {
            host: file.host,
            port: file.port,
            user: file.user,
            private_key,
            key_file,
            known_hosts_policy: file.known_hosts,
            known_hosts_file,
            connect_timeout: file.connect_timeout,
            command_timeout: file.command_timeout,
            config_dir: base_dir.to_path_buf(),
        })
    }

    /// Copy of this config pointing at another host, e.g. a freshly
    /// provisioned instance address.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self.clone()
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// PEM key content, when given inline or through the environment.
    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    /// Key file path, already resolved against the config directory.
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    pub fn known_hosts_policy(&self) -> KnownHostsPolicy {
        self.known_hosts_policy
    }

    pub fn known_hosts_file(&self) -> &Path {
        &self.known_hosts_file
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Directory the config was loaded from.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Settings for opening an SSH session to this host.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.host, &self.user)
            .port(self.port)
            .known_hosts_policy(self.known_hosts_policy)
            .known_hosts_path(&self.known_hosts_file)
            .connect_timeout(self.connect_timeout)
            .command_timeout(self.command_timeout);

        if let Some(pem) = &self.private_key {
            config = config.private_key(pem);
        }
        if let Some(path) = &self.key_file {
            config = config.key_path(path);
        }
        config
    }
}
