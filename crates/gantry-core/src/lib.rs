//! Configuration and the policy-guarded command executor shared by gantry
//! tool servers.

pub mod config;
pub mod error;
pub mod exec;

pub use config::{Config, ConfigError, PolicyConfig, ToolsConfig};
pub use error::ExecError;
pub use exec::{CommandReport, CommandSpec, CommandSummary, GuardedExecutor};

pub use gantry_output as output;
pub use gantry_policy as policy;
pub use gantry_runner as runner;
pub use gantry_tools as tools;
