use std::process::Command;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::{self, ByteBudget, Captured};
use crate::config::RunnerConfig;
use crate::error::RunError;
use crate::process::{self, ExitInfo, Process};
use crate::request::{EnvMode, KillSignal, RunRequest};
use crate::result::{RunResult, TIMEOUT_EXIT_CODE};

/// Spawns one child per request and reports how it ended.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `request` to completion.
    ///
    /// Nonzero exit, timeout and death by signal are reported in the
    /// [`RunResult`].
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when the program cannot be started or the request
    /// carries a zero timeout.
    pub async fn run(&self, request: &RunRequest) -> Result<RunResult, RunError> {
        let program = request.program.as_str();
        let timeout = request.timeout.unwrap_or_else(|| self.config.timeout());
        if timeout.is_zero() {
            return Err(RunError::InvalidRequest {
                program: program.to_owned(),
                reason: "timeout must be greater than zero".to_owned(),
            });
        }
        let max_bytes = request
            .max_buffer_bytes
            .unwrap_or(self.config.max_buffer_bytes);
        let max_lines = request.max_output_lines.or(self.config.max_output_lines);
        let kill_signal = request.kill_signal.unwrap_or(self.config.kill_signal);

        let mut command = build_command(request);
        let started = Instant::now();
        let (mut child, pipes) = process::spawn(&mut command, request.stdin.is_some())
            .map_err(|e| RunError::from_spawn(program, e))?;
        tracing::debug!(
            program,
            pid = child.pid(),
            shell = request.use_shell,
            timeout_ms = duration_ms_u64(timeout),
            "spawned {}",
            request.command_line()
        );

        let stop = CancellationToken::new();
        let budget = ByteBudget::new(max_bytes);
        let stdout_task = tokio::spawn(capture::drain(
            pipes.stdout,
            budget.clone(),
            stop.clone(),
        ));
        let stderr_task = tokio::spawn(capture::drain(pipes.stderr, budget, stop.clone()));
        if let (Some(stdin), Some(input)) = (pipes.stdin, request.stdin.clone()) {
            tokio::spawn(write_stdin(stdin, input));
        }

        let mut waiter = child.start_wait();
        let (exit, delivered) = match tokio::time::timeout(timeout, &mut waiter).await {
            Ok(joined) => (finish_wait(joined, program)?, None),
            Err(_) => {
                tracing::warn!(
                    program,
                    timeout_ms = duration_ms_u64(timeout),
                    signal = kill_signal.name(),
                    "command timed out, terminating process group"
                );
                let (exit, delivered) = self
                    .terminate(&child, kill_signal, &mut waiter, program)
                    .await?;
                (exit, Some(delivered))
            }
        };
        child.mark_reaped();

        let (stdout, stderr) = self.collect(stdout_task, stderr_task, &stop, program).await;
        let duration = started.elapsed();

        let timed_out = delivered.is_some();
        let (exit_code, signal) = match delivered {
            Some(delivered) => (TIMEOUT_EXIT_CODE, delivered.map(|s| s.name().to_owned())),
            None => exit_status(&exit),
        };

        let encoding = request.encoding;
        let (stdout_text, stdout_dropped) =
            capture::limit_lines(encoding.decode(&stdout.bytes), max_lines);
        let (stderr_text, stderr_dropped) =
            capture::limit_lines(encoding.decode(&stderr.bytes), max_lines);
        let truncated =
            stdout.overflowed || stderr.overflowed || stdout_dropped > 0 || stderr_dropped > 0;
        if truncated {
            tracing::debug!(
                program,
                max_bytes,
                stdout_dropped,
                stderr_dropped,
                "output truncated"
            );
        }

        let result = RunResult {
            exit_code,
            stdout: stdout_text,
            stderr: stderr_text,
            timed_out,
            signal,
            truncated,
            stdout_truncated_lines: (stdout_dropped > 0).then_some(stdout_dropped),
            stderr_truncated_lines: (stderr_dropped > 0).then_some(stderr_dropped),
            user_cpu_time_ms: exit.user_cpu.map(as_millis_f64),
            system_cpu_time_ms: exit.system_cpu.map(as_millis_f64),
            duration_ms: as_millis_f64(duration),
        };
        tracing::debug!(
            program,
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            duration_ms = result.duration_ms,
            "command finished"
        );
        Ok(result)
    }

    /// Like [`Runner::run`], but a timeout is an error.
    ///
    /// # Errors
    ///
    /// Everything [`Runner::run`] returns, plus [`RunError::TimedOut`] carrying
    /// the partial result.
    pub async fn run_checked(&self, request: &RunRequest) -> Result<RunResult, RunError> {
        let result = self.run(request).await?;
        if result.timed_out {
            let timeout = request.timeout.unwrap_or_else(|| self.config.timeout());
            return Err(RunError::TimedOut {
                program: request.program.clone(),
                timeout_ms: duration_ms_u64(timeout),
                result: Box::new(result),
            });
        }
        Ok(result)
    }

    /// Send `signal`, wait out the grace period, then escalate to SIGKILL.
    /// Returns the exit info and the last signal that was delivered.
    async fn terminate(
        &self,
        child: &Process,
        signal: KillSignal,
        waiter: &mut JoinHandle<std::io::Result<ExitInfo>>,
        program: &str,
    ) -> Result<(ExitInfo, Option<KillSignal>), RunError> {
        let mut delivered = None;
        match child.signal(signal) {
            Ok(()) => delivered = Some(signal),
            Err(e) => tracing::warn!(program, signal = signal.name(), "kill failed: {e}"),
        }

        if signal != KillSignal::Kill {
            match tokio::time::timeout(self.config.kill_grace(), &mut *waiter).await {
                Ok(joined) => return Ok((finish_wait(joined, program)?, delivered)),
                Err(_) => {
                    tracing::warn!(
                        program,
                        grace_ms = self.config.kill_grace_ms,
                        "process group survived {signal}, sending SIGKILL"
                    );
                    match child.signal(KillSignal::Kill) {
                        Ok(()) => delivered = Some(KillSignal::Kill),
                        Err(e) => tracing::warn!(program, "SIGKILL failed: {e}"),
                    }
                }
            }
        }

        let exit = finish_wait(waiter.await, program)?;
        Ok((exit, delivered))
    }

    /// Wait for both readers. A background process can hold the pipes open
    /// after the child exits, so reading stops after the kill grace period.
    async fn collect(
        &self,
        stdout_task: JoinHandle<Captured>,
        stderr_task: JoinHandle<Captured>,
        stop: &CancellationToken,
        program: &str,
    ) -> (Captured, Captured) {
        let deadline = {
            let stop = stop.clone();
            let grace = self.config.kill_grace();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                stop.cancel();
            })
        };
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        deadline.abort();
        if stop.is_cancelled() {
            tracing::warn!(program, "output pipes still open after exit, stopped reading");
        }
        (stdout, stderr)
    }
}

fn build_command(request: &RunRequest) -> Command {
    let mut command = if request.use_shell {
        shell_command(&request.command_line())
    } else {
        let mut command = Command::new(&request.program);
        command.args(&request.args);
        command
    };
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    if request.env_mode == EnvMode::Replace {
        command.env_clear();
    }
    command.envs(&request.env);
    command
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(not(unix))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

async fn write_stdin(mut stdin: ChildStdin, input: Vec<u8>) {
    if let Err(e) = stdin.write_all(&input).await {
        // The child may exit without reading its input.
        tracing::debug!("stdin write stopped: {e}");
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!("stdin close failed: {e}");
    }
}

fn finish_wait(
    joined: Result<std::io::Result<ExitInfo>, tokio::task::JoinError>,
    program: &str,
) -> Result<ExitInfo, RunError> {
    joined
        .map_err(std::io::Error::other)
        .and_then(|r| r)
        .map_err(|source| RunError::Wait {
            program: program.to_owned(),
            source,
        })
}

fn exit_status(exit: &ExitInfo) -> (i32, Option<String>) {
    match (exit.code, exit.signal) {
        (Some(code), _) => (code, None),
        (None, Some(signo)) => (128 + signo, Some(process::signal_name(signo))),
        (None, None) => (-1, None),
    }
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn duration_ms_u64(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
