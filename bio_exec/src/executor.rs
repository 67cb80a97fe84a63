//! # Executor
//!
//! Runs one [`ConcreteCommand`] as a bounded child process.
//!
//! - The child gets its own process group so a timeout can kill the whole tree.
//! - stdout and stderr are read concurrently into separate buffers capped at the
//!   maximum output size; anything beyond the cap is read and discarded so the child
//!   never blocks on a full pipe.
//! - On timeout the group is killed, the command's cleanup hook (e.g. `docker kill`) is
//!   run, and whatever output was captured so far is returned.
//!
//! Failures are reported as an [`InvocationResult`] value, never as `Err`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::invocation::ConcreteCommand;
use crate::mode::ExecutionMode;

/// Time allowed after a kill for the child to be reaped and its pipes drained.
const KILL_GRACE: Duration = Duration::from_secs(2);
/// Upper bound for the cleanup hook.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);
const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success,
    NonZeroExit,
    TimedOut,
    LaunchFailed,
    BackendUnavailable,
}

/// Everything observed about one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    pub outcome: InvocationOutcome,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    #[serde(rename = "elapsed_ms", with = "crate::utils::time::duration_millis")]
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
    pub mode: Option<ExecutionMode>,
    /// Launch error, signal, timeout or attempted-modes text.
    pub message: Option<String>,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.outcome == InvocationOutcome::Success
    }

    /// Result for a tool that could not be resolved to any mode.
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self {
            outcome: InvocationOutcome::BackendUnavailable,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            elapsed: Duration::ZERO,
            started_at: Utc::now(),
            mode: None,
            message: Some(message.into()),
        }
    }

    fn launch_failed(command: &ConcreteCommand, started_at: DateTime<Utc>, message: String) -> Self {
        Self {
            outcome: InvocationOutcome::LaunchFailed,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            elapsed: Duration::ZERO,
            started_at,
            mode: Some(command.mode),
            message: Some(message),
        }
    }
}

/// Byte buffer that keeps at most `limit` bytes and remembers whether it dropped any.
#[derive(Debug, Default)]
struct BoundedBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl BoundedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    /// Captured text, never longer than `limit` bytes.
    ///
    /// Lossy decoding turns each invalid byte into a 3-byte U+FFFD, so the decoded text
    /// is cut back to the last char boundary within the limit.
    fn snapshot(&self) -> (String, bool) {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        let mut truncated = self.truncated;
        if text.len() > self.limit {
            let mut end = self.limit;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
            truncated = true;
        }
        (text, truncated)
    }
}

type SharedBuffer = Arc<Mutex<BoundedBuffer>>;

fn spawn_reader<R>(stream: Option<R>, buffer: SharedBuffer) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut stream = stream?;
    Some(tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut buffer) = buffer.lock() {
                        buffer.push(&chunk[..n]);
                    }
                }
                Err(err) => {
                    debug!("Output stream closed with error: {err}");
                    break;
                }
            }
        }
    }))
}

fn snapshot(buffer: &SharedBuffer) -> (String, bool) {
    match buffer.lock() {
        Ok(buffer) => buffer.snapshot(),
        Err(poisoned) => poisoned.into_inner().snapshot(),
    }
}

/// Wait for a reader to hit EOF, giving up after `grace`.
async fn join_reader(handle: Option<JoinHandle<()>>, grace: Duration) {
    let Some(handle) = handle else {
        return;
    };
    let abort = handle.abort_handle();
    if timeout(grace, handle).await.is_err() {
        debug!("Output reader still open after {grace:?}; abandoning it");
        abort.abort();
    }
}

/// Run `command`, killing it after `limit` and capturing at most `max_output_size`
/// bytes per stream.
pub async fn execute(
    command: &ConcreteCommand,
    limit: Duration,
    max_output_size: usize,
) -> InvocationResult {
    let started_at = Utc::now();
    let start = Instant::now();

    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .envs(&command.env)
        .current_dir(&command.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    process.process_group(0);

    info!("Executing ({} mode): {}", command.mode, command.display_line());

    let mut child = match process.spawn() {
        Ok(child) => child,
        Err(err) => {
            let message = format!(
                "Failed to launch '{}': {err}",
                command.program.display()
            );
            warn!("{message}");
            return InvocationResult::launch_failed(command, started_at, message);
        }
    };
    let pid = child.id();

    let stdout_buf: SharedBuffer = Arc::new(Mutex::new(BoundedBuffer::new(max_output_size)));
    let stderr_buf: SharedBuffer = Arc::new(Mutex::new(BoundedBuffer::new(max_output_size)));
    let stdout_reader = spawn_reader(child.stdout.take(), stdout_buf.clone());
    let stderr_reader = spawn_reader(child.stderr.take(), stderr_buf.clone());

    let waited = timeout(limit, child.wait()).await;

    let status = match waited {
        Ok(Ok(status)) => {
            join_reader(stdout_reader, KILL_GRACE).await;
            join_reader(stderr_reader, KILL_GRACE).await;
            Some(status)
        }
        Ok(Err(err)) => {
            warn!("Failed to wait for child process: {err}");
            kill_tree(pid, &mut child).await;
            join_reader(stdout_reader, KILL_GRACE).await;
            join_reader(stderr_reader, KILL_GRACE).await;
            let (stdout, stdout_truncated) = snapshot(&stdout_buf);
            let (stderr, stderr_truncated) = snapshot(&stderr_buf);
            return InvocationResult {
                outcome: InvocationOutcome::LaunchFailed,
                exit_code: None,
                stdout,
                stderr,
                stdout_truncated,
                stderr_truncated,
                elapsed: start.elapsed(),
                started_at,
                mode: Some(command.mode),
                message: Some(format!("Failed to wait for child process: {err}")),
            };
        }
        Err(_) => {
            warn!(
                "Command timed out after {:.1}s; killing process group",
                limit.as_secs_f64()
            );
            kill_tree(pid, &mut child).await;
            if let Some(cleanup) = &command.cleanup {
                run_cleanup(cleanup).await;
            }
            join_reader(stdout_reader, KILL_GRACE).await;
            join_reader(stderr_reader, KILL_GRACE).await;
            None
        }
    };

    let elapsed = start.elapsed();
    let (stdout, stdout_truncated) = snapshot(&stdout_buf);
    let (stderr, stderr_truncated) = snapshot(&stderr_buf);
    if stdout_truncated || stderr_truncated {
        debug!("Output truncated at {max_output_size} bytes");
    }

    let (outcome, exit_code, message) = match status {
        None => (
            InvocationOutcome::TimedOut,
            None,
            Some(format!(
                "Command timed out after {:.1}s",
                limit.as_secs_f64()
            )),
        ),
        Some(status) => classify(status, &command.launch_failure_codes),
    };

    debug!(
        "Command finished: {outcome:?} (exit code {exit_code:?}) in {}ms",
        elapsed.as_millis()
    );

    InvocationResult {
        outcome,
        exit_code,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        elapsed,
        started_at,
        mode: Some(command.mode),
        message,
    }
}

fn classify(
    status: ExitStatus,
    launch_failure_codes: &[i32],
) -> (InvocationOutcome, Option<i32>, Option<String>) {
    match status.code() {
        Some(0) => (InvocationOutcome::Success, Some(0), None),
        Some(code) if launch_failure_codes.contains(&code) => (
            InvocationOutcome::LaunchFailed,
            Some(code),
            Some(format!("Backend failed to launch the tool (exit code {code})")),
        ),
        Some(code) => (
            InvocationOutcome::NonZeroExit,
            Some(code),
            Some(format!("Command exited with code {code}")),
        ),
        None => (
            InvocationOutcome::NonZeroExit,
            None,
            Some(describe_signal(status)),
        ),
    }
}

#[cfg(unix)]
fn describe_signal(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("Command terminated by signal {signal}"),
        None => "Command terminated without an exit code".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(_status: ExitStatus) -> String {
    "Command terminated without an exit code".to_string()
}

/// SIGKILL the child's process group, then reap the child.
async fn kill_tree(pid: Option<u32>, child: &mut tokio::process::Child) {
    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    if let Err(err) = child.start_kill() {
        debug!("Child kill failed: {err}");
    }
    if timeout(KILL_GRACE, child.wait()).await.is_err() {
        warn!("Child process did not exit within {KILL_GRACE:?} of SIGKILL");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!("killpg({raw}) failed: {err}");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn run_cleanup(cleanup: &[String]) {
    let Some((program, args)) = cleanup.split_first() else {
        return;
    };
    info!("Running cleanup: {}", cleanup.join(" "));
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    match timeout(CLEANUP_TIMEOUT, command.status()).await {
        Ok(Ok(status)) if !status.success() => {
            debug!("Cleanup command exited with {status}")
        }
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!("Cleanup command failed to launch: {err}"),
        Err(_) => warn!("Cleanup command timed out after {CLEANUP_TIMEOUT:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_buffer_keeps_prefix_and_flags_overflow() {
        let mut buffer = BoundedBuffer::new(5);
        buffer.push(b"abc");
        buffer.push(b"defg");
        buffer.push(b"h");
        let (text, truncated) = buffer.snapshot();
        assert_eq!(text, "abcde");
        assert!(truncated);
    }

    #[test]
    fn invalid_utf8_stays_within_limit() {
        let mut buffer = BoundedBuffer::new(8);
        buffer.push(&[0xFF; 8]);
        let (text, truncated) = buffer.snapshot();
        assert!(text.len() <= 8);
        assert_eq!(text, "\u{FFFD}\u{FFFD}");
        assert!(truncated);
    }

    #[test]
    fn split_character_at_limit_is_dropped() {
        let mut buffer = BoundedBuffer::new(3);
        buffer.push("éé".as_bytes());
        assert_eq!(buffer.snapshot(), ("é".to_string(), true));
    }

    #[test]
    fn bounded_buffer_exact_fit_is_not_truncated() {
        let mut buffer = BoundedBuffer::new(3);
        buffer.push(b"abc");
        assert_eq!(buffer.snapshot(), ("abc".to_string(), false));
    }
}
