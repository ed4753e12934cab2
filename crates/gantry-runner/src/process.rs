//! Platform layer: spawning into a fresh process group, reaping with
//! resource accounting, and signalling the whole group.

use std::io;
use std::process::{Command, Stdio};
use std::time::Duration;

use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;

use crate::request::KillSignal;

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExitInfo {
    pub(crate) code: Option<i32>,
    pub(crate) signal: Option<i32>,
    pub(crate) user_cpu: Option<Duration>,
    pub(crate) system_cpu: Option<Duration>,
}

pub(crate) struct Pipes {
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) stdout: ChildStdout,
    pub(crate) stderr: ChildStderr,
}

/// Spawn `command` with piped output. The child leads its own process group
/// on Unix so a timeout kill reaches any grandchildren.
pub(crate) fn spawn(command: &mut Command, piped_stdin: bool) -> io::Result<(Process, Pipes)> {
    command
        .stdin(if piped_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn()?;
    let pid = child.id();
    let stdin = child.stdin.take().map(ChildStdin::from_std).transpose()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout pipe missing"))
        .and_then(ChildStdout::from_std)?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr pipe missing"))
        .and_then(ChildStderr::from_std)?;

    let pipes = Pipes {
        stdin,
        stdout,
        stderr,
    };
    Ok((Process::new(pid, child), pipes))
}

#[cfg(unix)]
pub(crate) use unix::Process;

#[cfg(not(unix))]
pub(crate) use fallback::Process;

#[cfg(unix)]
mod unix {
    use super::{Duration, ExitInfo, JoinHandle, KillSignal, io};

    pub(crate) struct Process {
        pid: libc::pid_t,
        reaped: bool,
    }

    impl Process {
        pub(super) fn new(pid: u32, _child: std::process::Child) -> Self {
            // Reaping goes through wait4 below, so the std handle is dropped.
            Self {
                pid: libc::pid_t::try_from(pid).unwrap_or(libc::pid_t::MAX),
                reaped: false,
            }
        }

        pub(crate) fn pid(&self) -> u32 {
            u32::try_from(self.pid).unwrap_or_default()
        }

        /// Block on `wait4` in the blocking pool.
        pub(crate) fn start_wait(&self) -> JoinHandle<io::Result<ExitInfo>> {
            let pid = self.pid;
            tokio::task::spawn_blocking(move || wait4(pid))
        }

        /// Deliver `signal` to the child's process group.
        pub(crate) fn signal(&self, signal: KillSignal) -> io::Result<()> {
            // SAFETY: killpg only reads its integer arguments.
            let rc = unsafe { libc::killpg(self.pid, signal.as_raw()) };
            if rc == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        }

        pub(crate) fn mark_reaped(&mut self) {
            self.reaped = true;
        }
    }

    impl Drop for Process {
        fn drop(&mut self) {
            if !self.reaped {
                // The run was abandoned mid-flight. The pending wait4 still
                // reaps the child once it dies.
                let _ = self.signal(KillSignal::Kill);
            }
        }
    }

    fn wait4(pid: libc::pid_t) -> io::Result<ExitInfo> {
        let mut status: libc::c_int = 0;
        // SAFETY: rusage is plain old data; all-zero is a valid value.
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        loop {
            // SAFETY: both pointers refer to live locals for the duration of
            // the call.
            let rc = unsafe { libc::wait4(pid, &raw mut status, 0, &raw mut usage) };
            if rc != -1 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        Ok(ExitInfo {
            code: libc::WIFEXITED(status).then(|| libc::WEXITSTATUS(status)),
            signal: libc::WIFSIGNALED(status).then(|| libc::WTERMSIG(status)),
            user_cpu: Some(timeval_to_duration(usage.ru_utime)),
            system_cpu: Some(timeval_to_duration(usage.ru_stime)),
        })
    }

    fn timeval_to_duration(tv: libc::timeval) -> Duration {
        let secs = u64::try_from(tv.tv_sec).unwrap_or_default();
        let micros = u64::try_from(tv.tv_usec).unwrap_or_default();
        Duration::from_secs(secs) + Duration::from_micros(micros)
    }

    /// Conventional name for a raw signal number.
    pub(crate) fn signal_name(signo: i32) -> String {
        let name = match signo {
            libc::SIGHUP => "SIGHUP",
            libc::SIGINT => "SIGINT",
            libc::SIGQUIT => "SIGQUIT",
            libc::SIGILL => "SIGILL",
            libc::SIGTRAP => "SIGTRAP",
            libc::SIGABRT => "SIGABRT",
            libc::SIGBUS => "SIGBUS",
            libc::SIGFPE => "SIGFPE",
            libc::SIGKILL => "SIGKILL",
            libc::SIGUSR1 => "SIGUSR1",
            libc::SIGSEGV => "SIGSEGV",
            libc::SIGUSR2 => "SIGUSR2",
            libc::SIGPIPE => "SIGPIPE",
            libc::SIGALRM => "SIGALRM",
            libc::SIGTERM => "SIGTERM",
            libc::SIGXCPU => "SIGXCPU",
            libc::SIGXFSZ => "SIGXFSZ",
            _ => return format!("SIG{signo}"),
        };
        name.to_owned()
    }
}

#[cfg(unix)]
pub(crate) use unix::signal_name;

#[cfg(not(unix))]
pub(crate) fn signal_name(signo: i32) -> String {
    format!("SIG{signo}")
}

#[cfg(not(unix))]
mod fallback {
    use std::sync::{Arc, Mutex};

    use super::{Duration, ExitInfo, JoinHandle, KillSignal, io};

    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Polling implementation for platforms without process groups. No CPU
    /// accounting is available here.
    pub(crate) struct Process {
        pid: u32,
        child: Arc<Mutex<std::process::Child>>,
        reaped: bool,
    }

    impl Process {
        pub(super) fn new(pid: u32, child: std::process::Child) -> Self {
            Self {
                pid,
                child: Arc::new(Mutex::new(child)),
                reaped: false,
            }
        }

        pub(crate) fn pid(&self) -> u32 {
            self.pid
        }

        pub(crate) fn start_wait(&self) -> JoinHandle<io::Result<ExitInfo>> {
            let child = Arc::clone(&self.child);
            tokio::spawn(async move {
                loop {
                    let status = child
                        .lock()
                        .map_err(|_| io::Error::other("child handle poisoned"))?
                        .try_wait()?;
                    if let Some(status) = status {
                        return Ok(ExitInfo {
                            code: status.code(),
                            ..ExitInfo::default()
                        });
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            })
        }

        pub(crate) fn signal(&self, _signal: KillSignal) -> io::Result<()> {
            self.child
                .lock()
                .map_err(|_| io::Error::other("child handle poisoned"))?
                .kill()
        }

        pub(crate) fn mark_reaped(&mut self) {
            self.reaped = true;
        }
    }

    impl Drop for Process {
        fn drop(&mut self) {
            if !self.reaped {
                let _ = self.signal(KillSignal::Kill);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn known_signals_have_names() {
        assert_eq!(signal_name(libc::SIGKILL), "SIGKILL");
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
        assert_eq!(signal_name(libc::SIGSEGV), "SIGSEGV");
    }

    #[test]
    fn unknown_signal_falls_back_to_number() {
        assert_eq!(signal_name(250), "SIG250");
    }

    #[tokio::test]
    async fn wait_reports_cpu_time_and_exit_code() {
        let mut command = Command::new("sh");
        command.args(["-c", "exit 7"]);
        let (mut process, _pipes) = spawn(&mut command, false).unwrap();
        let info = process.start_wait().await.unwrap().unwrap();
        process.mark_reaped();
        assert_eq!(info.code, Some(7));
        assert_eq!(info.signal, None);
        assert!(info.user_cpu.is_some());
        assert!(info.system_cpu.is_some());
    }
}
