// ABOUTME: Output formatting for CLI feedback and remote command echoing.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use crate::ssh::{Command, CommandOutput};
use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
#[derive(Debug, Clone)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Default for Output {
    fn default() -> Self {
        Self::new(OutputMode::Normal)
    }
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                println!("{message}");
            }
            OutputMode::Json => self.emit_json("success", message),
        }
    }

    /// Print a warning message.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit_json_err("warning", message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => self.emit_json_err("error", message),
        }
    }

    /// Echo a command before it is sent to the remote host.
    pub fn command(&self, command: &Command) {
        match self.mode {
            OutputMode::Normal => print!("{}", format_section("Command", &command.lines())),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit_json("command", &command.script()),
        }
    }

    /// Echo captured stdout and stderr of a finished command.
    pub fn command_output(&self, output: &CommandOutput) {
        match self.mode {
            OutputMode::Normal => {
                let stdout: Vec<&str> = output.stdout.lines().collect();
                let stderr: Vec<&str> = output.stderr.lines().collect();
                if !stdout.is_empty() {
                    print!("{}", format_section("Output", &stdout));
                }
                if !stderr.is_empty() {
                    print!("{}", format_section("Error", &stderr));
                }
            }
            OutputMode::Quiet => {
                print!("{}", output.stdout);
                eprint!("{}", output.stderr);
            }
            OutputMode::Json => {
                let event = CommandEvent {
                    event: "command_output",
                    exit_code: output.exit_code,
                    stdout: &output.stdout,
                    stderr: &output.stderr,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    fn json_event<'a>(&self, event: &'a str, message: &'a str) -> JsonEvent<'a> {
        JsonEvent {
            event,
            message,
            duration_secs: if self.start_time.is_some() {
                Some(self.elapsed_secs())
            } else {
                None
            },
        }
    }

    fn emit_json(&self, event: &str, message: &str) {
        if let Ok(json) = serde_json::to_string(&self.json_event(event, message)) {
            println!("{json}");
        }
    }

    fn emit_json_err(&self, event: &str, message: &str) {
        if let Ok(json) = serde_json::to_string(&self.json_event(event, message)) {
            eprintln!("{json}");
        }
    }
}

/// A titled block with each line indented by two spaces.
fn format_section(title: &str, lines: &[&str]) -> String {
    let mut section = format!("{title}\n");
    for line in lines {
        section.push_str("  ");
        section.push_str(line.trim_end());
        section.push('\n');
    }
    section
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct CommandEvent<'a> {
    event: &'a str,
    exit_code: u32,
    stdout: &'a str,
    stderr: &'a str,
}
