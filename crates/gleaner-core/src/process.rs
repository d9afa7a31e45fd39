//! Bounded external process execution.
//!
//! Every git and tar call in gleaner goes through [`CommandRunner`]. The
//! production implementation, [`BoundedRunner`], races the child against an
//! optional deadline and kills it when the deadline wins.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::ProcessError;

/// A fully described external command.
#[derive(Clone)]
pub struct Invocation {
    /// Executable name or path.
    pub program: String,

    /// Arguments, in order.
    pub args: Vec<String>,

    /// Working directory; inherits the caller's when `None`.
    pub current_dir: Option<PathBuf>,

    /// Extra environment variables.
    pub envs: Vec<(String, String)>,

    /// Wall-clock limit. `None` waits indefinitely.
    pub deadline: Option<Duration>,

    secret: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            deadline: None,
            secret: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Mask `secret` wherever it appears in the rendered command line.
    pub fn redact(mut self, secret: Option<&str>) -> Self {
        self.secret = secret.filter(|s| !s.is_empty()).map(str::to_owned);
        self
    }

    /// Space-joined command line with the secret replaced by `***`.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        match &self.secret {
            Some(secret) => line.replace(secret.as_str(), "***"),
            None => line,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.command_line())
            .field("current_dir", &self.current_dir)
            .field("envs", &self.envs)
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Captured result of a process that exited successfully.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Time from spawn to exit.
    pub duration: Duration,
}

/// Executes invocations. Implementations must honour `Invocation::deadline`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is an error.
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands as tokio child processes under an optional deadline.
///
/// The deadline covers both the wait and the draining of stdout and stderr.
/// The timer lives only inside that future: once output is collected the
/// timer is dropped and can never fire a kill afterwards. On expiry the whole
/// process group is killed, so helpers such as `git-remote-https` or a
/// build's subprocesses do not outlive the call.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundedRunner;

impl BoundedRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for BoundedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        let command = invocation.command_line();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down every descendant.
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &invocation.envs {
            cmd.env(key, value);
        }

        debug!(
            command = %command,
            deadline_ms = invocation.deadline.map(|d| d.as_millis() as u64),
            "spawning process"
        );
        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: command.clone(),
            source,
        })?;
        let pid = child.id();

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        // Pipes can outlive the child when a descendant inherits them, so
        // draining counts against the deadline too.
        let finished = async {
            tokio::join!(child.wait(), read_pipe(stdout_pipe), read_pipe(stderr_pipe))
        };
        let outcome = match invocation.deadline {
            Some(limit) => timeout(limit, finished).await.map_err(|_| limit),
            None => Ok(finished.await),
        };

        let (waited, stdout, stderr) = match outcome {
            Ok(done) => done,
            Err(limit) => {
                warn!(
                    command = %command,
                    limit_ms = limit.as_millis() as u64,
                    "deadline elapsed, killing process"
                );
                terminate(&mut child, pid, &command).await;
                return Err(ProcessError::Timeout {
                    command,
                    limit,
                    pid,
                });
            }
        };

        let status = waited.map_err(|source| ProcessError::Wait {
            command: command.clone(),
            source,
        })?;
        let duration = start.elapsed();

        if !status.success() {
            return Err(ProcessError::Exit {
                command,
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        debug!(command = %command, duration_ms = duration.as_millis() as u64, "process exited");

        Ok(ProcessOutput {
            stdout,
            stderr,
            duration,
        })
    }
}

/// Kill the child's process group, then kill and reap the child itself.
///
/// `pid` is the id captured at spawn: `Child::id` is gone once the child has
/// been reaped, but its group lives on while any descendant does.
async fn terminate(child: &mut Child, pid: Option<u32>, command: &str) {
    if let Some(pid) = pid {
        kill_group(pid, command);
    }
    if child.id().is_none() {
        return;
    }
    // kill() also reaps the child.
    if let Err(e) = child.kill().await {
        warn!(command = %command, error = %e, "failed to kill timed out process");
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32, command: &str) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        debug!(command = %command, error = %e, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32, _command: &str) {}

async fn read_pipe<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await.ok();
    }
    String::from_utf8_lossy(&buf).into_owned()
}
