use gantry_policy::WORKDIR_POLICY;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_runner();
        self.apply_env_overrides_policy();
        self.apply_env_overrides_output();
    }

    fn apply_env_overrides_runner(&mut self) {
        if let Ok(v) = std::env::var("GANTRY_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) if ms > 0 => self.runner.timeout_ms = ms,
                _ => tracing::warn!("ignoring invalid GANTRY_TIMEOUT_MS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("GANTRY_MAX_BUFFER_BYTES") {
            match v.parse::<usize>() {
                Ok(bytes) => self.runner.max_buffer_bytes = bytes,
                Err(_) => tracing::warn!("ignoring invalid GANTRY_MAX_BUFFER_BYTES value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("GANTRY_MAX_OUTPUT_LINES")
            && let Ok(lines) = v.parse::<usize>()
        {
            self.runner.max_output_lines = Some(lines);
        }
    }

    fn apply_env_overrides_policy(&mut self) {
        if let Ok(v) = std::env::var("GANTRY_ALLOWED_COMMANDS") {
            self.policy.allowed_commands = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = std::env::var_os("GANTRY_ALLOWED_ROOTS") {
            let roots: Vec<_> = std::env::split_paths(&v)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            self.policy.roots.insert(WORKDIR_POLICY.to_owned(), roots);
        }
    }

    fn apply_env_overrides_output(&mut self) {
        if let Ok(v) = std::env::var("GANTRY_COMPACT_RATIO")
            && let Ok(ratio) = v.parse::<f64>()
        {
            if ratio.is_finite() && ratio > 0.0 {
                self.output.compact_ratio = ratio;
            } else {
                tracing::warn!("ignoring non-positive GANTRY_COMPACT_RATIO value: {v}");
            }
        }
        if let Ok(v) = std::env::var("GANTRY_LAZY_TOOLS")
            && let Ok(lazy) = v.parse::<bool>()
        {
            self.tools.lazy = lazy;
        }
    }
}
