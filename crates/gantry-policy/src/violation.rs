use std::fmt;

use serde::Serialize;

/// Category of a rejected input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DisallowedCommand,
    PathQualifiedCommand,
    FlagInjection,
    PathTraversal,
    OutsideRoot,
    SymlinkEscape,
    UnsafeVolumeMount,
    UnsafeUrlScheme,
    HeaderInjection,
    InvalidPortMapping,
    ShellInterpolation,
}

impl ViolationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DisallowedCommand => "disallowed_command",
            Self::PathQualifiedCommand => "path_qualified_command",
            Self::FlagInjection => "flag_injection",
            Self::PathTraversal => "path_traversal",
            Self::OutsideRoot => "outside_root",
            Self::SymlinkEscape => "symlink_escape",
            Self::UnsafeVolumeMount => "unsafe_volume_mount",
            Self::UnsafeUrlScheme => "unsafe_url_scheme",
            Self::HeaderInjection => "header_injection",
            Self::InvalidPortMapping => "invalid_port_mapping",
            Self::ShellInterpolation => "shell_interpolation",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied input rejected before any process is spawned.
///
/// The message text carries stable substrings (`must not start with "-"`,
/// `path traversal`, `outside the working directory`, `symlink resolves to`,
/// ...) that callers match on. Do not reword them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct PolicyViolation {
    pub kind: ViolationKind,
    pub field: String,
    pub message: String,
}

impl PolicyViolation {
    pub(crate) fn new(kind: ViolationKind, field: &str, message: String) -> Self {
        tracing::debug!(kind = kind.as_str(), field, "policy violation: {message}");
        Self {
            kind,
            field: field.to_owned(),
            message,
        }
    }
}
