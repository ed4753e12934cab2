use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

use gantry_output::{Compact, OutputEnvelope, OutputShaper, Render};
use gantry_policy::{PolicyGuard, PolicyViolation};
use gantry_runner::{RunRequest, RunResult, Runner};
use serde::Serialize;

use crate::config::Config;
use crate::error::ExecError;

const STDERR_TAIL_LINES: usize = 5;

/// A command assembled by an adapter.
///
/// `args` are literals the adapter itself wrote (subcommands, fixed flags).
/// `positionals` carry caller-supplied values tagged with the input field
/// they came from; they are appended after `args` and checked for flag
/// injection.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub positionals: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    /// Treat `program` as a shell command line. Only its first word is
    /// checked against the allowlist.
    pub use_shell: bool,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn positional(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.positionals.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn shell(mut self, use_shell: bool) -> Self {
        self.use_shell = use_shell;
        self
    }

    /// Name checked against the allowlist.
    #[must_use]
    pub fn program_name(&self) -> &str {
        if self.use_shell {
            self.program.split_whitespace().next().unwrap_or_default()
        } else {
            &self.program
        }
    }

    fn into_request(self) -> RunRequest {
        let mut request = RunRequest::new(self.program)
            .with_args(self.args)
            .with_args(self.positionals.into_iter().map(|(_, value)| value));
        request.cwd = self.cwd;
        request.stdin = self.stdin;
        request.env = self.env;
        request.timeout = self.timeout;
        request.use_shell = self.use_shell;
        request
    }
}

/// Outcome of a guarded command, in the shape tools hand back to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReport {
    pub command: String,
    pub exit_code: i32,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    pub truncated: bool,
    pub duration_ms: f64,
}

impl CommandReport {
    fn new(command: String, result: RunResult) -> Self {
        Self {
            command,
            exit_code: result.exit_code,
            success: result.success(),
            stdout: result.stdout,
            stderr: result.stderr,
            timed_out: result.timed_out,
            signal: result.signal,
            truncated: result.truncated,
            duration_ms: result.duration_ms,
        }
    }

    /// Stdout and stderr together, the baseline for the compaction decision.
    #[must_use]
    pub fn raw_text(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    fn status_line(&self) -> String {
        if self.timed_out {
            format!("[timed out, exit {}]", self.exit_code)
        } else {
            format!("[exit {}]", self.exit_code)
        }
    }
}

impl Render for CommandReport {
    fn render(&self) -> String {
        let mut out = format!("$ {}\n", self.command);
        out.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            out.push('\n');
        }
        if !self.stderr.is_empty() {
            out.push_str("[stderr]\n");
            out.push_str(&self.stderr);
            if !self.stderr.ends_with('\n') {
                out.push('\n');
            }
        }
        if self.truncated {
            out.push_str("[output truncated]\n");
        }
        out.push_str(&self.status_line());
        out
    }
}

/// Counts plus the last few stderr lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub command: String,
    pub exit_code: i32,
    pub success: bool,
    pub timed_out: bool,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    pub stderr_tail: Vec<String>,
    pub truncated: bool,
}

impl Compact for CommandReport {
    type Compact = CommandSummary;

    fn to_compact(&self) -> CommandSummary {
        let stderr: Vec<&str> = self.stderr.lines().collect();
        let tail_start = stderr.len().saturating_sub(STDERR_TAIL_LINES);
        CommandSummary {
            command: self.command.clone(),
            exit_code: self.exit_code,
            success: self.success,
            timed_out: self.timed_out,
            stdout_lines: self.stdout.lines().count(),
            stderr_lines: stderr.len(),
            stderr_tail: stderr[tail_start..].iter().map(|s| (*s).to_owned()).collect(),
            truncated: self.truncated,
        }
    }
}

impl Render for CommandSummary {
    fn render(&self) -> String {
        let mut out = format!(
            "$ {}\n{} stdout lines, {} stderr lines",
            self.command, self.stdout_lines, self.stderr_lines
        );
        if self.truncated {
            out.push_str(" (truncated)");
        }
        for line in &self.stderr_tail {
            let _ = write!(out, "\n  {line}");
        }
        if self.timed_out {
            let _ = write!(out, "\n[timed out, exit {}]", self.exit_code);
        } else {
            let _ = write!(out, "\n[exit {}]", self.exit_code);
        }
        out
    }
}

/// Runs [`CommandSpec`]s through the policy guard before spawning.
#[derive(Debug, Clone, Default)]
pub struct GuardedExecutor {
    guard: PolicyGuard,
    runner: Runner,
    shaper: OutputShaper,
}

impl GuardedExecutor {
    #[must_use]
    pub fn new(guard: PolicyGuard, runner: Runner, shaper: OutputShaper) -> Self {
        Self {
            guard,
            runner,
            shaper,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.policy.guard(),
            Runner::new(config.runner.clone()),
            OutputShaper::new(config.output.clone()),
        )
    }

    #[must_use]
    pub fn guard(&self) -> &PolicyGuard {
        &self.guard
    }

    /// Policy checks in order: bare program name, allowlist, no positionals
    /// in shell mode, flag injection on each positional, then the `workdir`
    /// roots for the working directory. A spec without `cwd` is checked
    /// against the directory it would inherit.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check(&self, spec: &CommandSpec) -> Result<(), PolicyViolation> {
        self.guard.check_program(spec.program_name())?;
        if spec.use_shell {
            self.guard
                .check_shell_positionals(spec.positionals.iter().map(|(field, _)| field.as_str()))?;
        }
        for (field, value) in &spec.positionals {
            self.guard.check_positional(field, value)?;
        }
        match &spec.cwd {
            Some(cwd) => self.guard.check_workdir(cwd),
            None => self.guard.check_inherited_workdir(),
        }
    }

    /// Check `spec` and run it.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Policy`] before anything is spawned, or
    /// [`ExecError::Run`] when the program cannot be started.
    pub async fn execute(&self, spec: CommandSpec) -> Result<CommandReport, ExecError> {
        if let Err(violation) = self.check(&spec) {
            tracing::warn!(
                program = %spec.program,
                kind = violation.kind.as_str(),
                field = %violation.field,
                "command rejected"
            );
            return Err(violation.into());
        }
        let request = spec.into_request();
        let command = request.command_line();
        let result = self.runner.run(&request).await?;
        Ok(CommandReport::new(command, result))
    }

    /// [`GuardedExecutor::execute`] packaged as an envelope, compacted when
    /// the full report outweighs the raw output.
    ///
    /// # Errors
    ///
    /// See [`GuardedExecutor::execute`]; also [`ExecError::Shape`].
    pub async fn execute_shaped(
        &self,
        spec: CommandSpec,
        force_full: bool,
    ) -> Result<OutputEnvelope, ExecError> {
        let report = self.execute(spec).await?;
        self.shape(&report, force_full)
    }

    /// Package `report`, compacted unless `force_full` is set or the full
    /// report is no larger than the raw output.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Shape`] if the report cannot be serialized.
    pub fn shape(
        &self,
        report: &CommandReport,
        force_full: bool,
    ) -> Result<OutputEnvelope, ExecError> {
        Ok(self
            .shaper
            .compact(report, &report.raw_text(), force_full)?)
    }
}
