// ABOUTME: Shell command implementation.
// ABOUTME: Hands the terminal to the system ssh client using the configured key and known_hosts.

use sshrelay::config::SshConfig;
use sshrelay::error::{Error, Result};
use sshrelay::ssh::KnownHostsPolicy;
use std::ffi::OsString;

const SSH_PROGRAM: &str = "ssh";

/// Run an interactive `ssh` session and wait for it to exit.
pub async fn open_shell(config: SshConfig) -> Result<()> {
    let args = ssh_args(&config)?;
    tracing::debug!("running {} {:?}", SSH_PROGRAM, args);

    let status = tokio::process::Command::new(SSH_PROGRAM)
        .args(&args)
        .status()
        .await
        .map_err(|e| Error::ExternalTool {
            tool: SSH_PROGRAM.to_string(),
            reason: e.to_string(),
        })?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(Error::CommandExit {
            code: u32::try_from(code).unwrap_or(1),
        }),
        None => Err(Error::ExternalTool {
            tool: SSH_PROGRAM.to_string(),
            reason: "terminated by signal".to_string(),
        }),
    }
}

/// Arguments for the system ssh client.
pub(crate) fn ssh_args(config: &SshConfig) -> Result<Vec<OsString>> {
    let key_file = config.key_file().ok_or_else(|| {
        Error::InvalidConfig("shell requires key_file; inline keys are not passed to ssh".to_string())
    })?;

    let strict = match config.known_hosts_policy() {
        KnownHostsPolicy::TrustOnFirstUse => "accept-new",
        KnownHostsPolicy::Ignore => "no",
        KnownHostsPolicy::Strict => "yes",
    };

    let mut known_hosts = OsString::from("UserKnownHostsFile=");
    known_hosts.push(config.known_hosts_file());

    Ok(vec![
        OsString::from("-l"),
        OsString::from(config.user()),
        OsString::from("-i"),
        key_file.as_os_str().to_os_string(),
        OsString::from("-p"),
        OsString::from(config.port().to_string()),
        OsString::from("-o"),
        OsString::from(format!("StrictHostKeyChecking={}", strict)),
        OsString::from("-o"),
        known_hosts,
        OsString::from(config.host()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn args_use_config_dir_key_and_known_hosts() {
        let yaml = "ip: 10.1.2.3\nuser: ubuntu\nkey_file: id_ed25519\nknown_hosts: ignore\n";
        let config = SshConfig::from_yaml(yaml, Path::new("/work/instance")).unwrap();

        let args = ssh_args(&config).unwrap();
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();

        assert_eq!(
            args,
            [
                "-l",
                "ubuntu",
                "-i",
                "/work/instance/id_ed25519",
                "-p",
                "22",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/work/instance/known_hosts",
                "10.1.2.3",
            ]
        );
    }

    #[test]
    fn trust_on_first_use_accepts_new_keys_only() {
        let yaml = "ip: 10.1.2.3\nuser: ubuntu\nkey_file: id\n";
        let config = SshConfig::from_yaml(yaml, Path::new("/w")).unwrap();
        let args = ssh_args(&config).unwrap();
        assert!(args.contains(&OsString::from("StrictHostKeyChecking=accept-new")));
    }

    #[test]
    fn inline_key_is_rejected() {
        let yaml = "ip: 10.1.2.3\nuser: ubuntu\nkey: PEM\n";
        let config = SshConfig::from_yaml(yaml, Path::new("/w")).unwrap();
        assert!(matches!(ssh_args(&config), Err(Error::InvalidConfig(_))));
    }
}
