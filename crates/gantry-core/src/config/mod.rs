mod env;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gantry_output::ShaperConfig;
use gantry_policy::{AllowedRoots, CommandAllowlist, PolicyGuard};
use gantry_runner::RunnerConfig;
use gantry_tools::ToolFilter;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub output: ShaperConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Programs this server may spawn. Empty allows nothing.
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// Policy name to the directories its paths must stay within.
    #[serde(default)]
    pub roots: BTreeMap<String, Vec<PathBuf>>,
}

impl PolicyConfig {
    #[must_use]
    pub fn guard(&self) -> PolicyGuard {
        let mut roots = AllowedRoots::new();
        for (name, paths) in &self.roots {
            roots.insert(name, paths);
        }
        PolicyGuard::new(CommandAllowlist::new(&self.allowed_commands), roots)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Defer non-core tools until `discover-tools` is called.
    #[serde(default)]
    pub lazy: bool,
    #[serde(default)]
    pub core: Vec<String>,
    /// Tools that never register.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file doesn't exist, then apply `GANTRY_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?;
            toml::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// `$GANTRY_CONFIG`, else `gantry/config.toml` under the user config
    /// directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GANTRY_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("gantry").join("config.toml"))
    }

    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if a value has no TOML representation.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl ToolFilter for Config {
    fn should_register_tool(&self, name: &str) -> bool {
        !self.tools.disabled.iter().any(|d| d == name)
    }

    fn is_core_tool(&self, name: &str) -> bool {
        self.tools.core.iter().any(|c| c == name)
    }
}
