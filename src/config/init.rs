// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates ssh.yml template files.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

const DEFAULT_HOST: &str = "203.0.113.10";
const DEFAULT_USER: &str = "ubuntu";
const DEFAULT_KEY_FILE: &str = "id_ed25519";

pub fn init_config(dir: &Path, host: Option<&str>, user: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let host = host.unwrap_or(DEFAULT_HOST);
    let user = user.unwrap_or(DEFAULT_USER);

    if host.trim().is_empty() {
        return Err(Error::InvalidConfig("host must not be empty".to_string()));
    }
    if user.trim().is_empty() {
        return Err(Error::InvalidConfig("user must not be empty".to_string()));
    }

    let yaml = generate_template_yaml(host, user);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(host: &str, user: &str) -> String {
    format!(
        r#"ip: {}
user: {}
# Private key file, relative to this directory.
key_file: {}
# Or inline key content, optionally from the environment:
# key:
#   env: SSH_PRIVATE_KEY
# Host key handling: trust-on-first-use (default), strict, or ignore
# known_hosts: trust-on-first-use
# connect_timeout: 30s
# command_timeout: 5m
"#,
        host, user, DEFAULT_KEY_FILE
    )
}
