use serde::Serialize;

/// Exit code reported for a run that was killed on timeout, matching the
/// coreutils `timeout` convention.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Outcome of a completed run. Nonzero exits, timeouts and signal deaths are
/// all reported here rather than as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_truncated_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_truncated_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_cpu_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_cpu_time_ms: Option<f64>,
    pub duration_ms: f64,
}

impl RunResult {
    /// Exited with status 0 within the timeout.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunResult {
        RunResult {
            exit_code: 0,
            stdout: "ok\n".into(),
            stderr: String::new(),
            timed_out: false,
            signal: None,
            truncated: false,
            stdout_truncated_lines: None,
            stderr_truncated_lines: None,
            user_cpu_time_ms: None,
            system_cpu_time_ms: None,
            duration_ms: 1.5,
        }
    }

    #[test]
    fn serializes_camel_case_and_skips_absent_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["exitCode"], 0);
        assert_eq!(json["timedOut"], false);
        assert_eq!(json["durationMs"], 1.5);
        assert!(json.get("signal").is_none());
        assert!(json.get("truncated").is_none());
        assert!(json.get("userCpuTimeMs").is_none());
    }

    #[test]
    fn timed_out_fields_serialized() {
        let result = RunResult {
            exit_code: TIMEOUT_EXIT_CODE,
            timed_out: true,
            signal: Some("SIGTERM".into()),
            truncated: true,
            stdout_truncated_lines: Some(3),
            ..sample()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["exitCode"], 124);
        assert_eq!(json["signal"], "SIGTERM");
        assert_eq!(json["truncated"], true);
        assert_eq!(json["stdoutTruncatedLines"], 3);
        assert!(!result.success());
    }

    #[test]
    fn success_requires_zero_exit() {
        assert!(sample().success());
        let failed = RunResult {
            exit_code: 1,
            ..sample()
        };
        assert!(!failed.success());
    }
}
