use crate::violation::{PolicyViolation, ViolationKind};

/// Host paths that must never be bind-mounted into a container. `/` matches
/// exactly; every other entry also matches as a directory prefix.
const DANGEROUS_HOST_PATHS: &[&str] = &[
    "/",
    "/etc",
    "/proc",
    "/sys",
    "/dev",
    "/root",
    "/var/run/docker.sock",
    "/run/docker.sock",
];

/// Validate a `host:container[:options]` mount specification.
///
/// Named volumes are always allowed. Host paths are normalized (`..` folded)
/// and rejected when they hit a system location or a bare Windows drive root.
///
/// # Errors
///
/// Returns a [`ViolationKind::UnsafeVolumeMount`] violation whose message
/// contains `dangerous host path`.
pub fn assert_safe_volume_mount(value: &str) -> Result<(), PolicyViolation> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PolicyViolation::new(
            ViolationKind::UnsafeVolumeMount,
            "volume",
            "volume mount must not be empty".to_owned(),
        ));
    }

    let host = host_part(trimmed);
    if let Some(rest) = drive_remainder(host) {
        let normalized = normalize_segments(&rest.replace('\\', "/"));
        if matches!(normalized.trim_matches('/'), "" | ".") {
            return Err(dangerous(value, host));
        }
        return Ok(());
    }

    if !is_host_path(host) {
        return Ok(());
    }
    let normalized = normalize_segments(host);
    let hit = DANGEROUS_HOST_PATHS.iter().any(|&danger| {
        normalized == danger
            || (danger != "/"
                && normalized
                    .strip_prefix(danger)
                    .is_some_and(|tail| tail.starts_with('/')))
    });
    if hit {
        return Err(dangerous(value, &normalized));
    }
    Ok(())
}

fn dangerous(value: &str, host: &str) -> PolicyViolation {
    PolicyViolation::new(
        ViolationKind::UnsafeVolumeMount,
        "volume",
        format!(
            "volume mount \"{value}\" uses dangerous host path \"{host}\"; mounting system locations is not allowed"
        ),
    )
}

/// Host side of a mount spec. A leading drive letter (`C:\...`) keeps its
/// colon.
fn host_part(value: &str) -> &str {
    let offset = if drive_remainder(value).is_some() { 2 } else { 0 };
    match value[offset..].find(':') {
        Some(idx) => &value[..offset + idx],
        None => value,
    }
}

/// For `C:`, `C:\x` or `C:/x`, everything after the drive letter and colon.
fn drive_remainder(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || matches!(bytes[2], b'\\' | b'/'))
    {
        Some(&value[2..])
    } else {
        None
    }
}

fn is_host_path(host: &str) -> bool {
    host.starts_with('/')
        || host.starts_with("./")
        || host.starts_with("../")
        || host.starts_with('~')
        || host == "."
        || host == ".."
}

/// Fold `.` and `..` segments of a `/`-separated path without touching the
/// filesystem. Absolute paths cannot climb above `/`.
fn normalize_segments(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_owned()
    } else {
        joined
    }
}
