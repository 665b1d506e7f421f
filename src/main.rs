// ABOUTME: Entry point for the sshrelay CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use sshrelay::config::{self, SshConfig};
use sshrelay::error::{Error, Result};
use sshrelay::output::{Output, OutputMode};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    match run(cli, output.clone()).await {
        Ok(()) => {}
        Err(Error::CommandExit { code }) => {
            std::process::exit(i32::try_from(code).unwrap_or(1));
        }
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    match cli.command {
        Commands::Init { host, user, force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, host.as_deref(), user.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Ip => {
            let config = load_config(cli.config.as_deref())?;
            output.success(config.host());
            Ok(())
        }
        Commands::Exec { command } => {
            let config = load_config(cli.config.as_deref())?;
            commands::exec_command(config, command, output).await
        }
        Commands::Put {
            files,
            remote_dir,
            run,
            cleanup,
        } => {
            let config = load_config(cli.config.as_deref())?;
            commands::put_files(config, files, remote_dir, run, cleanup, output).await
        }
        Commands::Forward {
            port,
            host,
            local_port,
        } => {
            let config = load_config(cli.config.as_deref())?;
            commands::forward_port(config, host, port, local_port, output).await
        }
        Commands::Shell => {
            let config = load_config(cli.config.as_deref())?;
            commands::open_shell(config).await
        }
    }
}

/// Load the config from an explicit path or discover it in the working directory.
fn load_config(path: Option<&Path>) -> Result<SshConfig> {
    match path {
        Some(path) => SshConfig::load(path),
        None => SshConfig::discover(&env::current_dir()?),
    }
}
