// ABOUTME: Remote command representation and captured command output.
// ABOUTME: A command is a single shell line or a sequence run in one remote shell.

use super::error::{Error, Result};
use russh::Sig;
use std::fmt;

/// A command to run on the remote host.
///
/// A `Sequence` runs in a single remote shell, one line per command, so
/// `cd` and exported variables carry over to later commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Single(String),
    Sequence(Vec<String>),
}

impl Command {
    /// Text sent to the remote shell.
    pub fn script(&self) -> String {
        match self {
            Command::Single(command) => command.clone(),
            Command::Sequence(commands) => commands.join("\n"),
        }
    }

    /// Individual command lines, as echoed to the user.
    pub fn lines(&self) -> Vec<&str> {
        match self {
            Command::Single(command) => vec![command.as_str()],
            Command::Sequence(commands) => commands.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines().iter().all(|line| line.trim().is_empty())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Single(command) => write!(f, "{}", command),
            Command::Sequence(commands) => write!(f, "{}", commands.join("; ")),
        }
    }
}

impl From<&str> for Command {
    fn from(command: &str) -> Self {
        Command::Single(command.to_string())
    }
}

impl From<String> for Command {
    fn from(command: String) -> Self {
        Command::Single(command)
    }
}

impl From<Vec<String>> for Command {
    fn from(commands: Vec<String>) -> Self {
        Command::Sequence(commands)
    }
}

impl From<Vec<&str>> for Command {
    fn from(commands: Vec<&str>) -> Self {
        Command::Sequence(commands.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Command {
    fn from(commands: [&str; N]) -> Self {
        Command::Sequence(commands.iter().map(|c| c.to_string()).collect())
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// The command that produced this output.
    pub command: Command,
    /// Exit code of the command.
    pub exit_code: u32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a nonzero exit status into an error.
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::NonZeroExit {
                command: self.command.to_string(),
                code: self.exit_code,
            })
        }
    }
}

/// Exit code for a command killed by a signal, following the shell's 128+n rule.
///
/// Signals without a standard number map to 255.
pub fn signal_exit_code(signal: &Sig) -> u32 {
    let number = match signal {
        Sig::HUP => 1,
        Sig::INT => 2,
        Sig::QUIT => 3,
        Sig::ILL => 4,
        Sig::ABRT => 6,
        Sig::FPE => 8,
        Sig::KILL => 9,
        Sig::USR1 => 10,
        Sig::SEGV => 11,
        Sig::PIPE => 13,
        Sig::ALRM => 14,
        Sig::TERM => 15,
        Sig::Custom(_) => return 255,
    };
    128 + number
}
