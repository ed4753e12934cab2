use std::collections::BTreeSet;

use crate::violation::{PolicyViolation, ViolationKind};

/// Per-server set of program names that may be spawned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandAllowlist {
    commands: BTreeSet<String>,
}

impl CommandAllowlist {
    #[must_use]
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands
                .into_iter()
                .map(Into::into)
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, program: &str) -> bool {
        self.commands.contains(program)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }
}

/// Reject `program` unless it appears in `allowlist`.
///
/// # Errors
///
/// Returns a [`ViolationKind::DisallowedCommand`] violation.
pub fn assert_allowed_command(
    program: &str,
    allowlist: &CommandAllowlist,
) -> Result<(), PolicyViolation> {
    if allowlist.contains(program) {
        return Ok(());
    }
    let allowed: Vec<&str> = allowlist.iter().collect();
    Err(PolicyViolation::new(
        ViolationKind::DisallowedCommand,
        "command",
        format!(
            "command \"{program}\" is not allowed; allowed commands: {}",
            if allowed.is_empty() {
                "(none)".to_owned()
            } else {
                allowed.join(", ")
            }
        ),
    ))
}

/// Reject program names carrying a path separator, so an allowed-looking name
/// cannot point at an arbitrary binary on disk.
///
/// # Errors
///
/// Returns a [`ViolationKind::PathQualifiedCommand`] violation.
pub fn assert_no_path_qualified_command(program: &str) -> Result<(), PolicyViolation> {
    if program.contains(['/', '\\']) {
        return Err(PolicyViolation::new(
            ViolationKind::PathQualifiedCommand,
            "command",
            format!("command \"{program}\" must be a bare program name, not a path"),
        ));
    }
    Ok(())
}

/// Reject values that a target program could read as an option flag when
/// passed positionally. Leading whitespace does not help: the trimmed value is
/// checked.
///
/// # Errors
///
/// Returns a [`ViolationKind::FlagInjection`] violation whose message contains
/// `must not start with "-"`.
pub fn assert_no_flag_injection(value: &str, field: &str) -> Result<(), PolicyViolation> {
    if value.trim().starts_with('-') {
        return Err(PolicyViolation::new(
            ViolationKind::FlagInjection,
            field,
            format!(
                "{field} must not start with \"-\" (got \"{value}\"); values starting with a dash could be interpreted as command-line flags"
            ),
        ));
    }
    Ok(())
}

/// Reject caller-supplied values bound for a shell command line. `sh -c`
/// would interpret `;`, `&&` or `$(...)` inside them, so shell commands may
/// only carry literals written by the adapter.
///
/// # Errors
///
/// Returns a [`ViolationKind::ShellInterpolation`] violation naming the first
/// field.
pub fn assert_no_shell_positionals<'a, I>(fields: I) -> Result<(), PolicyViolation>
where
    I: IntoIterator<Item = &'a str>,
{
    if let Some(field) = fields.into_iter().next() {
        return Err(PolicyViolation::new(
            ViolationKind::ShellInterpolation,
            field,
            format!(
                "{field} cannot be passed to a shell command line; caller-supplied values are only accepted as separate arguments"
            ),
        ));
    }
    Ok(())
}
