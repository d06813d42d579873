//! Process spawning with a hard timeout.
//!
//! Provides async process spawning with:
//! - Argument-vector invocation (no shell in between)
//! - Full stdout/stderr capture
//! - Timeout with kill-and-reap of the child
//! - Working directory configuration

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Configuration options for spawning a process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// The program to execute.
    pub program: String,

    /// Arguments passed verbatim to the program.
    pub args: Vec<String>,

    /// Working directory for the process.
    pub working_dir: Option<PathBuf>,

    /// Deadline for the whole execution.
    pub timeout: Option<Duration>,
}

impl ProcessOptions {
    /// Create new options for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set a timeout for the process.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Result from a finished (or killed) process.
#[derive(Debug)]
pub struct ProcessResult {
    /// Exit status; `None` when the process was killed on timeout.
    pub status: Option<ExitStatus>,

    /// Captured stdout, lossily decoded as UTF-8.
    pub stdout: String,

    /// Captured stderr, lossily decoded as UTF-8.
    pub stderr: String,

    /// Whether the process was killed due to timeout.
    pub timed_out: bool,

    /// Wall time from spawn until exit or kill.
    pub elapsed: Duration,
}

impl ProcessResult {
    /// Check if the process exited successfully.
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }

    /// Get the exit code, if available.
    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// Elapsed time in whole milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Spawn a process and wait for it, collecting all output.
///
/// The timeout covers both the exit and the draining of its output, so a
/// descendant that keeps the pipes open cannot stretch it. On expiry the
/// child's whole process group is killed, the child is reaped, and
/// `timed_out` is set on the result. Spawn and wait failures are errors.
pub async fn spawn_process(options: ProcessOptions) -> Result<ProcessResult> {
    let mut cmd = Command::new(&options.program);
    cmd.args(&options.args);

    if let Some(ref dir) = options.working_dir {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    // Own group, so a timeout can take the tool's descendants down with it
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn process: {}", options.program))?;
    let pid = child.id();

    let mut stdout_task = child.stdout.take().map(read_all);
    let mut stderr_task = child.stderr.take().map(read_all);

    let run = async {
        let status = child
            .wait()
            .await
            .context("Failed to wait for process to exit")?;
        let stdout = collect(stdout_task.as_mut()).await;
        let stderr = collect(stderr_task.as_mut()).await;
        anyhow::Ok((status, stdout, stderr))
    };

    let finished = match options.timeout {
        Some(duration) => tokio::time::timeout(duration, run).await.ok(),
        None => Some(run.await),
    };

    if let Some(outcome) = finished {
        let (status, stdout, stderr) = outcome?;
        return Ok(ProcessResult {
            status: Some(status),
            stdout,
            stderr,
            timed_out: false,
            elapsed: started.elapsed(),
        });
    }

    if let Some(pid) = pid {
        kill_process_group(pid).await;
    }
    if child.try_wait().ok().flatten().is_none() {
        // kill() sends SIGKILL and reaps the child
        child
            .kill()
            .await
            .context("Failed to kill timed-out process")?;
    }
    abort_reader(stdout_task);
    abort_reader(stderr_task);

    Ok(ProcessResult {
        status: None,
        stdout: String::new(),
        stderr: String::new(),
        timed_out: true,
        elapsed: started.elapsed(),
    })
}

/// SIGKILL every process in the group led by `pgid`.
#[cfg(unix)]
async fn kill_process_group(pgid: u32) {
    let group = format!("-{pgid}");
    match Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) if output.status.success() => {}
        Ok(output) => tracing::debug!(
            pgid,
            "kill of process group failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => tracing::debug!(pgid, "Failed to run kill for process group: {e}"),
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pgid: u32) {}

fn read_all<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            tracing::debug!("Error reading process output: {e}");
        }
        buf
    })
}

async fn collect(task: Option<&mut JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(handle) => handle
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default(),
        None => String::new(),
    }
}

fn abort_reader(task: Option<JoinHandle<Vec<u8>>>) {
    if let Some(handle) = task {
        handle.abort();
    }
}
