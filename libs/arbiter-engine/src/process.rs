//! Process Runner
//!
//! Spawns one interpreter process, captures stdout/stderr separately and
//! enforces a hard wall-clock limit.
//!
//! **Safety Guarantees:**
//! - Clean environment: the host environment is cleared, only `PATH` and
//!   explicitly configured variables reach the child
//! - Hard timeout: the child is killed and reaped when the limit expires
//! - Whole tree: the child leads its own process group and the group is
//!   killed once the child is done, so forked helpers never outlive a run
//! - Bounded capture: output beyond the byte cap is drained and dropped
//! - Guaranteed kill: `kill_on_drop` covers cancellation of the caller

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to keep reading pipes after the child exited. Grandchildren
/// holding the pipes open must not stall grading.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

const TRUNCATION_MARKER: &str = "\n[output truncated]";

pub struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub cwd: &'a Path,
    pub path_env: &'a str,
    pub env: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed for exceeding its time limit.
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.map(|s| s.success()).unwrap_or(false)
    }

    /// Human-readable reason for a non-successful exit.
    pub fn failure_message(&self) -> Option<String> {
        let status = self.status?;
        if status.success() {
            return None;
        }
        if let Some(code) = status.code() {
            return Some(format!("Process exited with status {}", code));
        }
        Some(signal_message(&status))
    }
}

#[cfg(unix)]
fn signal_message(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(9) => "[Process killed: likely exceeded memory limit]".to_string(),
        Some(11) => "[Process killed: segmentation fault]".to_string(),
        Some(sig) => format!("[Process killed by signal {}]", sig),
        None => "Process terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn signal_message(_status: &ExitStatus) -> String {
    "Process terminated abnormally".to_string()
}

/// Run a program to completion or until `time_limit` expires.
///
/// A timeout is a normal outcome (`timed_out = true`), not an error. `Err`
/// is reserved for failing to spawn or wait on the process.
pub async fn run_program(spec: &ProcessSpec<'_>, time_limit: Duration, max_output_bytes: usize) -> Result<ProcessOutput> {
    let mut cmd = Command::new(spec.program);
    cmd.args(&spec.args)
        .current_dir(spec.cwd)
        .env_clear()
        .env("PATH", spec.path_env)
        .envs(spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn '{}'", spec.program))?;
    let mut group = ProcessGroup::of(&child);

    let stdout_task = spawn_reader(child.stdout.take(), max_output_bytes);
    let stderr_task = spawn_reader(child.stderr.take(), max_output_bytes);

    match tokio::time::timeout(time_limit, child.wait()).await {
        Ok(status) => {
            let status = status.context("Failed to wait for child process")?;
            let elapsed = start.elapsed();

            // leftover background processes would otherwise hold the pipes open
            group.kill();

            let stdout = collect(stdout_task, "stdout").await;
            let stderr = collect(stderr_task, "stderr").await;

            debug!(
                program = spec.program,
                status = ?status,
                elapsed_ms = elapsed.as_millis() as u64,
                "Process exited"
            );

            Ok(ProcessOutput {
                stdout,
                stderr,
                status: Some(status),
                timed_out: false,
                elapsed,
            })
        }
        Err(_) => {
            warn!(
                program = spec.program,
                limit_ms = time_limit.as_millis() as u64,
                "Execution timed out - killing process"
            );

            group.kill();
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill timed-out process");
            }
            let elapsed = start.elapsed();

            stdout_task.abort();
            stderr_task.abort();

            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                status: None,
                timed_out: true,
                elapsed,
            })
        }
    }
}

/// Process group led by the spawned child. Killed explicitly once the
/// child is done, and on drop if the caller is cancelled first.
struct ProcessGroup {
    #[cfg(unix)]
    pgid: Option<nix::unistd::Pid>,
}

impl ProcessGroup {
    #[cfg(unix)]
    fn of(child: &Child) -> Self {
        let pgid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(nix::unistd::Pid::from_raw);
        Self { pgid }
    }

    #[cfg(not(unix))]
    fn of(_child: &Child) -> Self {
        Self {}
    }

    /// SIGKILL every member of the group. Only the first call signals.
    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};

        let Some(pgid) = self.pgid.take() else {
            return;
        };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) => debug!(pgid = pgid.as_raw(), "Process group killed"),
            // nothing left in the group
            Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid = pgid.as_raw(), error = %e, "Failed to kill process group"),
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

fn spawn_reader<R>(pipe: Option<R>, limit: usize) -> JoinHandle<std::io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match pipe {
            Some(reader) => read_capped(reader, limit).await,
            None => Ok(String::new()),
        }
    })
}

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<String> {
    let mut buf = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;

    let dropped = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;

    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if dropped > 0 {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}

async fn collect(mut task: JoinHandle<std::io::Result<String>>, stream: &str) -> String {
    match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut task).await {
        Ok(Ok(Ok(text))) => text,
        Ok(Ok(Err(e))) => {
            warn!(stream, error = %e, "Error reading process output");
            String::new()
        }
        Ok(Err(e)) => {
            warn!(stream, error = %e, "Output reader task failed");
            String::new()
        }
        Err(_) => {
            task.abort();
            warn!(stream, "Output pipe still open after exit; discarding");
            String::new()
        }
    }
}
