use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::violation::{PolicyViolation, ViolationKind};

/// Named sets of filesystem roots, e.g. `workdir -> [/home/me/projects]`.
///
/// Roots are canonicalized when added so later comparisons see through
/// symlinked prefixes such as `/tmp` on macOS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedRoots {
    policies: BTreeMap<String, Vec<PathBuf>>,
}

impl AllowedRoots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_policy<I, P>(mut self, name: &str, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.insert(name, roots);
        self
    }

    pub fn insert<I, P>(&mut self, name: &str, roots: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots = roots
            .into_iter()
            .map(Into::into)
            .map(|p| resolve_path(&p))
            .collect();
        self.policies.insert(name.to_owned(), roots);
    }

    /// Roots configured for `name`, or `None` when the policy is unrestricted.
    #[must_use]
    pub fn roots(&self, name: &str) -> Option<&[PathBuf]> {
        self.policies
            .get(name)
            .map(Vec::as_slice)
            .filter(|roots| !roots.is_empty())
    }

    pub fn policies(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.policies
            .iter()
            .map(|(name, roots)| (name.as_str(), roots.as_slice()))
    }
}

/// Confirm that `path` lies within one of the roots configured for
/// `policy_name`. A policy without configured roots is unrestricted.
///
/// Relative paths resolve against the process working directory. Existing
/// ancestors are canonicalized, so a symlink inside a root that points
/// elsewhere is judged by its target.
///
/// # Errors
///
/// Returns a [`ViolationKind::OutsideRoot`] violation.
pub fn assert_allowed_root(
    path: &Path,
    policy_name: &str,
    roots: &AllowedRoots,
) -> Result<(), PolicyViolation> {
    let Some(allowed) = roots.roots(policy_name) else {
        return Ok(());
    };
    let resolved = resolve_path(path);
    if allowed.iter().any(|root| resolved.starts_with(root)) {
        return Ok(());
    }
    let listed: Vec<String> = allowed.iter().map(|r| r.display().to_string()).collect();
    Err(PolicyViolation::new(
        ViolationKind::OutsideRoot,
        policy_name,
        format!(
            "path \"{}\" is outside the allowed roots for policy \"{policy_name}\": {}",
            path.display(),
            listed.join(", ")
        ),
    ))
}

/// Validate a caller-supplied file path relative to `cwd`.
///
/// Checks, in order:
/// 1. no `..` segment (either separator) - `path traversal`;
/// 2. absolute paths must stay under `cwd` - `outside the working directory`;
/// 3. if the path exists, its real location must stay under the real `cwd` -
///    `symlink resolves to`.
///
/// Paths that do not exist yet skip only the third check.
///
/// # Errors
///
/// Returns a [`PolicyViolation`] of kind `PathTraversal`, `OutsideRoot` or
/// `SymlinkEscape`.
pub fn assert_safe_file_path(path: &str, cwd: &Path) -> Result<(), PolicyViolation> {
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PolicyViolation::new(
            ViolationKind::PathTraversal,
            "path",
            format!("path \"{path}\" contains a \"..\" segment; path traversal is not allowed"),
        ));
    }

    let candidate = Path::new(path);
    let cwd_abs = absolutize(cwd);
    let real_cwd = cwd_abs
        .canonicalize()
        .unwrap_or_else(|_| normalize(&cwd_abs));

    let full = if candidate.is_absolute() {
        let normalized = normalize(candidate);
        if !normalized.starts_with(normalize(&cwd_abs)) && !normalized.starts_with(&real_cwd) {
            return Err(PolicyViolation::new(
                ViolationKind::OutsideRoot,
                "path",
                format!(
                    "path \"{path}\" is outside the working directory ({})",
                    cwd_abs.display()
                ),
            ));
        }
        normalized
    } else {
        cwd_abs.join(candidate)
    };

    // symlink_metadata also sees dangling links, which canonicalize rejects.
    if std::fs::symlink_metadata(&full).is_err() {
        return Ok(());
    }
    let real = full.canonicalize().unwrap_or_else(|_| dangling_target(&full));
    if !real.starts_with(&real_cwd) {
        return Err(PolicyViolation::new(
            ViolationKind::SymlinkEscape,
            "path",
            format!(
                "path \"{path}\": symlink resolves to \"{}\", which escapes {}",
                real.display(),
                real_cwd.display()
            ),
        ));
    }
    Ok(())
}

/// Lexically fold `.` and `..` components. `..` at the root stays at the root;
/// leading `..` of a relative path are preserved.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

/// Absolute, canonical form of `path`; components past the longest existing
/// ancestor are appended lexically.
fn resolve_path(path: &Path) -> PathBuf {
    normalize(&resolve_via_ancestors(&absolutize(path)))
}

fn resolve_via_ancestors(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut suffix = PathBuf::new();
    while !existing.exists() {
        if let Some(parent) = existing.parent() {
            if let Some(name) = existing.file_name() {
                suffix = PathBuf::from(name).join(&suffix);
            }
            existing = parent;
        } else {
            break;
        }
    }
    let base = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    if suffix.as_os_str().is_empty() {
        base
    } else {
        base.join(&suffix)
    }
}

fn dangling_target(link: &Path) -> PathBuf {
    let Ok(target) = std::fs::read_link(link) else {
        return link.to_path_buf();
    };
    if target.is_absolute() {
        normalize(&target)
    } else {
        let parent = link.parent().unwrap_or_else(|| Path::new("/"));
        normalize(&resolve_via_ancestors(parent).join(target))
    }
}
