// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sshrelay")]
#[command(about = "Run commands, copy files, and forward ports on a remote instance over SSH")]
#[command(version)]
pub struct Cli {
    /// Path to the SSH config file (default: ssh.yml in the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print results (for CI)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new ssh.yml configuration file
    Init {
        /// Address of the remote instance
        #[arg(long)]
        host: Option<String>,

        /// Login user on the remote instance
        #[arg(long)]
        user: Option<String>,

        /// Overwrite an existing ssh.yml
        #[arg(long)]
        force: bool,
    },

    /// Print the configured host address
    Ip,

    /// Run commands on the remote host; each argument is one command
    Exec {
        #[arg(required = true)]
        command: Vec<String>,
    },

    /// Upload files into a freshly created remote directory
    Put {
        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Remote directory to recreate and upload into
        #[arg(long)]
        remote_dir: String,

        /// Command to run after uploading (repeatable)
        #[arg(long)]
        run: Vec<String>,

        /// Remove the remote directory when done
        #[arg(long)]
        cleanup: bool,
    },

    /// Forward a local port to a port reachable from the remote host
    Forward {
        /// Remote port to forward to
        port: u16,

        /// Host to connect to from the remote side
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Local port to listen on (default: same as the remote port)
        #[arg(long)]
        local_port: Option<u16>,
    },

    /// Open an interactive shell with the system ssh client
    Shell,
}
