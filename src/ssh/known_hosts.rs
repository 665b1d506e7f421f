// ABOUTME: Host key verification policy for SSH connections.
// ABOUTME: Supports trust-on-first-use, ignore, and strict known_hosts checking.

use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key;
use serde::de::{self, Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnownHostsPolicy {
    /// Accept and record unknown hosts; reject changed keys.
    #[default]
    TrustOnFirstUse,
    /// Accept every host key without checking.
    Ignore,
    /// Only accept hosts already present in known_hosts.
    Strict,
}

impl FromStr for KnownHostsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trust-on-first-use" | "tofu" => Ok(KnownHostsPolicy::TrustOnFirstUse),
            "ignore" => Ok(KnownHostsPolicy::Ignore),
            "strict" => Ok(KnownHostsPolicy::Strict),
            _ => Err(format!("unknown known_hosts policy: {}", s)),
        }
    }
}

impl fmt::Display for KnownHostsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnownHostsPolicy::TrustOnFirstUse => write!(f, "trust-on-first-use"),
            KnownHostsPolicy::Ignore => write!(f, "ignore"),
            KnownHostsPolicy::Strict => write!(f, "strict"),
        }
    }
}

impl<'de> Deserialize<'de> for KnownHostsPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Decides whether a server key is acceptable for `host:port`.
#[derive(Debug, Clone)]
pub(crate) struct HostKeyVerifier {
    host: String,
    port: u16,
    policy: KnownHostsPolicy,
    known_hosts_path: Option<PathBuf>,
}

impl HostKeyVerifier {
    pub(crate) fn new(
        host: String,
        port: u16,
        policy: KnownHostsPolicy,
        known_hosts_path: Option<PathBuf>,
    ) -> Self {
        Self {
            host,
            port,
            policy,
            known_hosts_path,
        }
    }

    pub(crate) fn verify(&self, server_public_key: &ssh_key::PublicKey) -> bool {
        if self.policy == KnownHostsPolicy::Ignore {
            tracing::warn!(
                "host key verification disabled: accepting key for {}:{} unchecked",
                self.host,
                self.port
            );
            return true;
        }

        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => true,
            Ok(false) => {
                if self.policy != KnownHostsPolicy::TrustOnFirstUse {
                    tracing::warn!("host {}:{} not found in known_hosts", self.host, self.port);
                    return false;
                }
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                if let Err(e) = self.learn(server_public_key) {
                    tracing::warn!("Failed to save host key to known_hosts: {}", e);
                }
                true
            }
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::warn!(
                    "host key for {}:{} does not match known_hosts",
                    self.host,
                    self.port
                );
                false
            }
            // An unreadable known_hosts file is treated as an unknown host.
            Err(e) => {
                tracing::debug!("known_hosts check failed: {}", e);
                if self.policy == KnownHostsPolicy::TrustOnFirstUse {
                    if let Err(e) = self.learn(server_public_key) {
                        tracing::warn!("Failed to save host key to known_hosts: {}", e);
                    }
                    true
                } else {
                    false
                }
            }
        }
    }

    fn learn(&self, server_public_key: &ssh_key::PublicKey) -> Result<(), russh::keys::Error> {
        match &self.known_hosts_path {
            Some(path) => {
                ensure_parent(path);
                learn_known_hosts_path(&self.host, self.port, server_public_key, path)
            }
            None => learn_known_hosts(&self.host, self.port, server_public_key),
        }
    }
}

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::debug!("Failed to create {}: {}", parent.display(), e);
            }
        }
    }
}
