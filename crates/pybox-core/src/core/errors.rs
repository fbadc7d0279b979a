use std::io;
use std::path::PathBuf;

/// Failures surfaced by the harness.
///
/// Setup failures (`EnvCreate`, `Wheelhouse`) are fatal for every test that
/// depends on them. `CommandFailed` is only ever built by the command
/// primitive in [`crate::IsolatedEnv::run`]; everything above it propagates it
/// unchanged.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid harness configuration: {message}")]
    Config { message: String },
    #[error("failed to start {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("command exited with code {code}: {command}")]
    CommandFailed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("failed to create environment at {}: {reason}", root.display())]
    EnvCreate { root: PathBuf, reason: String },
    #[error("wheelhouse unavailable: {reason}")]
    Wheelhouse { reason: String },
    #[error("failed to provision package fixture '{package}': {reason}")]
    Fixture { package: String, reason: String },
    #[error("python {what} probe failed: {reason}")]
    Probe { what: String, reason: String },
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl HarnessError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Exit code of the failed command, if this is a command failure.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this failure invalidates every test that shares the session.
    #[must_use]
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Self::EnvCreate { .. } | Self::Wheelhouse { .. })
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_display_names_the_command() {
        let err = HarnessError::CommandFailed {
            command: "/venv/bin/python -m pip install nope".into(),
            code: 1,
            stdout: String::new(),
            stderr: "ERROR: No matching distribution".into(),
        };
        let message = err.to_string();
        assert!(message.contains("/venv/bin/python -m pip install nope"));
        assert!(message.contains("code 1"));
        assert_eq!(err.exit_code(), Some(1));
        assert!(!err.is_setup_failure());
    }

    #[test]
    fn setup_failures_are_flagged() {
        let err = HarnessError::Wheelhouse {
            reason: "pip download exited with code 2".into(),
        };
        assert!(err.is_setup_failure());
        assert_eq!(err.exit_code(), None);
    }
}
