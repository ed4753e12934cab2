use std::io;

use crate::result::RunResult;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("command not found: {program}")]
    NotFound { program: String },

    #[error("permission denied executing {program}")]
    PermissionDenied { program: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid run request for {program}: {reason}")]
    InvalidRequest { program: String, reason: String },

    /// Only produced by [`crate::Runner::run_checked`].
    #[error("{program} timed out after {timeout_ms}ms")]
    TimedOut {
        program: String,
        timeout_ms: u64,
        result: Box<RunResult>,
    },
}

impl RunError {
    pub(crate) fn from_spawn(program: &str, err: io::Error) -> Self {
        let program = program.to_owned();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { program },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ => Self::Spawn {
                program,
                source: err,
            },
        }
    }

    /// Name of the program the failed run was for.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::NotFound { program }
            | Self::PermissionDenied { program }
            | Self::Spawn { program, .. }
            | Self::Wait { program, .. }
            | Self::InvalidRequest { program, .. }
            | Self::TimedOut { program, .. } => program,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_errors_are_classified() {
        let err = RunError::from_spawn("nope", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, RunError::NotFound { .. }));
        assert_eq!(err.to_string(), "command not found: nope");

        let err = RunError::from_spawn("x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, RunError::PermissionDenied { .. }));
        assert!(err.to_string().contains('x'));

        let err = RunError::from_spawn("y", io::Error::other("boom"));
        assert!(matches!(err, RunError::Spawn { .. }));
        assert_eq!(err.to_string(), "failed to spawn y: boom");
        assert_eq!(err.program(), "y");
    }
}
