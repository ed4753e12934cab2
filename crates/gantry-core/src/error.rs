use gantry_output::ShapeError;
use gantry_policy::PolicyViolation;
use gantry_runner::RunError;

/// Why a guarded command produced no result.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_is_transparent() {
        let err = ExecError::from(RunError::NotFound {
            program: "kubectl".into(),
        });
        assert_eq!(err.to_string(), "command not found: kubectl");
    }

    #[test]
    fn policy_error_prefixed() {
        let violation = gantry_policy::assert_no_flag_injection("-rf", "path").unwrap_err();
        let err = ExecError::from(violation);
        assert!(err.to_string().starts_with("policy violation: path must not start with \"-\""));
    }
}
