use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::violation::{PolicyViolation, ViolationKind};

/// Reject empty URLs and anything other than `http://` or `https://`
/// (case-insensitive). `file:`, `data:`, `javascript:` and friends never pass.
///
/// # Errors
///
/// Returns a [`ViolationKind::UnsafeUrlScheme`] violation.
pub fn assert_safe_url(url: &str) -> Result<(), PolicyViolation> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(PolicyViolation::new(
            ViolationKind::UnsafeUrlScheme,
            "url",
            "url must not be empty".to_owned(),
        ));
    }

    let lower = trimmed.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        let scheme = trimmed.split(':').next().unwrap_or_default();
        return Err(PolicyViolation::new(
            ViolationKind::UnsafeUrlScheme,
            "url",
            format!("URL scheme not allowed: \"{scheme}\"; only http:// and https:// URLs are accepted"),
        ));
    }

    match Url::parse(trimmed) {
        Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(()),
        Ok(_) => Err(PolicyViolation::new(
            ViolationKind::UnsafeUrlScheme,
            "url",
            format!("invalid URL \"{trimmed}\": missing host"),
        )),
        Err(e) => Err(PolicyViolation::new(
            ViolationKind::UnsafeUrlScheme,
            "url",
            format!("invalid URL \"{trimmed}\": {e}"),
        )),
    }
}

/// Reject header keys or values carrying CR, LF or NUL, which would let a
/// caller split headers or responses.
///
/// # Errors
///
/// Returns a [`ViolationKind::HeaderInjection`] violation.
pub fn assert_safe_header(key: &str, value: &str) -> Result<(), PolicyViolation> {
    const FORBIDDEN: [char; 3] = ['\r', '\n', '\0'];
    if key.contains(FORBIDDEN) {
        return Err(PolicyViolation::new(
            ViolationKind::HeaderInjection,
            "header",
            format!(
                "header injection: header name {key:?} contains CR, LF or NUL characters"
            ),
        ));
    }
    if value.contains(FORBIDDEN) {
        return Err(PolicyViolation::new(
            ViolationKind::HeaderInjection,
            "header",
            format!(
                "header injection: value of header \"{key}\" contains CR, LF or NUL characters"
            ),
        ));
    }
    Ok(())
}

static PORT_MAPPING: LazyLock<Regex> = LazyLock::new(|| {
    let port = r"\d{1,5}(?:-\d{1,5})?";
    let ip = r"(?:\d{1,3}(?:\.\d{1,3}){3}|\[[0-9A-Fa-f:.]+\])";
    Regex::new(&format!(
        r"^(?:(?:{ip}:)?(?P<host>{port}):)?(?P<container>{port})(?:/(?:tcp|udp|sctp))?$"
    ))
    .expect("port mapping pattern is valid")
});

/// Validate a container port mapping: `PORT`, `HOST:CONTAINER`,
/// `HOST:CONTAINER/proto`, `IP:HOST:CONTAINER[/proto]`, with `A-B` ranges on
/// either side.
///
/// # Errors
///
/// Returns a [`ViolationKind::InvalidPortMapping`] violation describing the
/// accepted formats.
pub fn assert_valid_port_mapping(value: &str) -> Result<(), PolicyViolation> {
    let invalid = |reason: &str| {
        PolicyViolation::new(
            ViolationKind::InvalidPortMapping,
            "ports",
            format!(
                "invalid port mapping \"{value}\": {reason}; expected PORT, HOST:CONTAINER, HOST:CONTAINER/proto or IP:HOST:CONTAINER[/proto]"
            ),
        )
    };

    let Some(caps) = PORT_MAPPING.captures(value) else {
        return Err(invalid("unrecognized format"));
    };
    for side in ["host", "container"] {
        if let Some(m) = caps.name(side) {
            check_port_range(m.as_str()).map_err(|reason| invalid(&reason))?;
        }
    }
    Ok(())
}

fn check_port_range(spec: &str) -> Result<(), String> {
    let (start, end) = spec.split_once('-').unwrap_or((spec, spec));
    let start = parse_port(start)?;
    let end = parse_port(end)?;
    if start > end {
        return Err(format!("range {spec} is descending"));
    }
    Ok(())
}

fn parse_port(raw: &str) -> Result<u16, String> {
    match raw.parse::<u32>() {
        Ok(p @ 1..=65_535) => u16::try_from(p).map_err(|e| e.to_string()),
        _ => Err(format!("port {raw} is out of range 1-65535")),
    }
}
