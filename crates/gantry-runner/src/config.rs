use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::KillSignal;

/// Defaults applied to requests that leave a limit unset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_lines: Option<usize>,
    #[serde(default)]
    pub kill_signal: KillSignal,
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_buffer_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_kill_grace_ms() -> u64 {
    2_000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_buffer_bytes: default_max_buffer_bytes(),
            max_output_lines: None,
            kill_signal: KillSignal::default(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}
