//! Child process execution with timeouts, bounded output capture and
//! structured results.
//!
//! Programs are always spawned from an argument vector. Shell interpretation
//! is available only through [`RunRequest::with_shell`].

pub mod config;
pub mod error;
pub mod request;
pub mod result;
pub mod runner;

mod capture;
mod process;

pub use config::RunnerConfig;
pub use error::RunError;
pub use request::{EnvMode, Encoding, KillSignal, RunRequest};
pub use result::{RunResult, TIMEOUT_EXIT_CODE};
pub use runner::Runner;
