// ABOUTME: Diagnostics accumulator for non-fatal warnings during remote operations.
// ABOUTME: Collects teardown problems that shouldn't fail a command but should be shown to users.

/// Collects non-fatal warnings during remote operations.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a remote operation.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Create an SSH disconnect warning.
    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SshDisconnect,
            message: message.into(),
        }
    }

    /// Create a staging cleanup warning.
    pub fn staging_cleanup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StagingCleanup,
            message: message.into(),
        }
    }

    /// Create a port forward shutdown warning.
    pub fn forward_shutdown(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ForwardShutdown,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during remote operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
    /// Failed to remove a remote staging directory (it may remain).
    StagingCleanup,
    /// Connections failed or were cut off while forwarding.
    ForwardShutdown,
}
