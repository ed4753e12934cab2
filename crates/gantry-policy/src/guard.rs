use std::path::Path;

use crate::command::{
    CommandAllowlist, assert_allowed_command, assert_no_flag_injection,
    assert_no_path_qualified_command, assert_no_shell_positionals,
};
use crate::path::{AllowedRoots, assert_allowed_root, assert_safe_file_path};
use crate::violation::{PolicyViolation, ViolationKind};

/// Policy name whose roots bound command working directories.
pub const WORKDIR_POLICY: &str = "workdir";

/// Deployment policy with the allowlist and root sets pre-bound.
///
/// Built once at startup and shared read-only between concurrent calls.
#[derive(Debug, Clone, Default)]
pub struct PolicyGuard {
    allowlist: CommandAllowlist,
    roots: AllowedRoots,
}

impl PolicyGuard {
    #[must_use]
    pub fn new(allowlist: CommandAllowlist, roots: AllowedRoots) -> Self {
        Self { allowlist, roots }
    }

    #[must_use]
    pub fn allowlist(&self) -> &CommandAllowlist {
        &self.allowlist
    }

    #[must_use]
    pub fn roots(&self) -> &AllowedRoots {
        &self.roots
    }

    /// Bare-name check followed by the allowlist check.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn check_program(&self, program: &str) -> Result<(), PolicyViolation> {
        assert_no_path_qualified_command(program)?;
        assert_allowed_command(program, &self.allowlist)
    }

    /// # Errors
    ///
    /// Returns a flag-injection violation naming `field`.
    pub fn check_positional(&self, field: &str, value: &str) -> Result<(), PolicyViolation> {
        assert_no_flag_injection(value, field)
    }

    /// Working directories must sit under the `workdir` roots, when configured.
    ///
    /// # Errors
    ///
    /// Returns an outside-root violation.
    pub fn check_workdir(&self, cwd: &Path) -> Result<(), PolicyViolation> {
        assert_allowed_root(cwd, WORKDIR_POLICY, &self.roots)
    }

    /// Shell command lines take no caller-supplied fields.
    ///
    /// # Errors
    ///
    /// Returns a shell-interpolation violation naming the first field.
    pub fn check_shell_positionals<'a, I>(&self, fields: I) -> Result<(), PolicyViolation>
    where
        I: IntoIterator<Item = &'a str>,
    {
        assert_no_shell_positionals(fields)
    }

    /// [`PolicyGuard::check_workdir`] for the process working directory, which
    /// a command inherits when it names none.
    ///
    /// # Errors
    ///
    /// Returns an outside-root violation, also when the working directory
    /// cannot be determined while `workdir` roots are configured.
    pub fn check_inherited_workdir(&self) -> Result<(), PolicyViolation> {
        if self.roots.roots(WORKDIR_POLICY).is_none() {
            return Ok(());
        }
        let cwd = std::env::current_dir().map_err(|e| {
            PolicyViolation::new(
                ViolationKind::OutsideRoot,
                "cwd",
                format!("working directory could not be determined: {e}"),
            )
        })?;
        self.check_workdir(&cwd)
    }

    /// # Errors
    ///
    /// Returns an outside-root violation.
    pub fn check_root(&self, path: &Path, policy_name: &str) -> Result<(), PolicyViolation> {
        assert_allowed_root(path, policy_name, &self.roots)
    }

    /// # Errors
    ///
    /// Returns a traversal, outside-root or symlink violation.
    pub fn check_file(&self, path: &str, cwd: &Path) -> Result<(), PolicyViolation> {
        assert_safe_file_path(path, cwd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(root: &Path) -> PolicyGuard {
        PolicyGuard::new(
            CommandAllowlist::new(["git", "cargo"]),
            AllowedRoots::new().with_policy(WORKDIR_POLICY, [root]),
        )
    }

    #[test]
    fn path_check_runs_before_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let err = guard(dir.path()).check_program("/usr/bin/git").unwrap_err();
        assert_eq!(err.kind, ViolationKind::PathQualifiedCommand);
    }

    #[test]
    fn allowed_program_passes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(guard(dir.path()).check_program("git").is_ok());
        assert!(guard(dir.path()).check_program("rm").is_err());
    }

    #[test]
    fn workdir_bounded_by_roots() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let g = guard(dir.path());
        assert!(g.check_workdir(dir.path()).is_ok());
        assert!(g.check_workdir(other.path()).is_err());
    }

    #[test]
    fn inherited_workdir_checked_against_roots() {
        let dir = tempfile::tempdir().unwrap();
        let err = guard(dir.path()).check_inherited_workdir().unwrap_err();
        assert_eq!(err.kind, ViolationKind::OutsideRoot);

        let cwd = std::env::current_dir().unwrap();
        assert!(guard(&cwd).check_inherited_workdir().is_ok());
        assert!(PolicyGuard::default().check_inherited_workdir().is_ok());
    }

    #[test]
    fn default_guard_allows_no_programs() {
        let g = PolicyGuard::default();
        assert!(g.check_program("git").is_err());
        assert!(g.check_workdir(Path::new("/")).is_ok());
    }

    #[test]
    fn positional_check_names_field() {
        let g = PolicyGuard::default();
        let err = g.check_positional("branch", "--delete").unwrap_err();
        assert_eq!(err.field, "branch");
    }
}
