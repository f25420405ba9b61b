//! Process Runner
//!
//! Launches one aligner process per plan, with stdout bound to the plan's
//! output file and stderr captured into a bounded in-memory tail. The
//! wall-clock timeout tears down the whole process group, so helper
//! processes spawned by the aligner never outlive the invocation.

use super::command::CommandPlan;
use super::timeout::ExecutionTimeout;
use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command as TokioCommand};
use tracing::{debug, info, warn};

/// Maximum stderr retained per invocation (64 KiB)
pub const MAX_STDERR_BYTES: usize = 64 * 1024;

/// How long to keep reading stderr once the child has exited
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// What happened to one child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the process never started or died from a signal
    pub exit_code: Option<i32>,

    /// Terminating signal, if any
    pub signal: Option<i32>,

    /// Wall-clock time the launch was attempted
    pub started_at: SystemTime,

    /// Captured stderr (tail), or the launch error description
    pub stderr: String,

    /// Whether the head of stderr was discarded
    pub stderr_truncated: bool,

    /// Wall-clock time from spawn to exit
    pub duration: Duration,

    /// Whether the timeout fired and the process group was killed
    pub timed_out: bool,
}

impl ProcessOutcome {
    fn not_started(message: String, started_at: SystemTime, started: Instant) -> Self {
        Self {
            exit_code: None,
            signal: None,
            started_at,
            stderr: message,
            stderr_truncated: false,
            duration: started.elapsed(),
            timed_out: false,
        }
    }

    /// Whether the process could not be started at all
    pub fn launch_failed(&self) -> bool {
        !self.timed_out && self.exit_code.is_none() && self.signal.is_none()
    }
}

/// Runs a [`CommandPlan`] to completion
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the plan, never returning an error: every failure mode is encoded
    /// in the outcome
    async fn run(&self, plan: &CommandPlan, timeout: ExecutionTimeout) -> ProcessOutcome;
}

/// [`ProcessRunner`] backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    max_stderr_bytes: usize,
    drain_grace: Duration,
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self {
            max_stderr_bytes: MAX_STDERR_BYTES,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    /// Override the stderr retention limit
    pub fn with_max_stderr_bytes(mut self, bytes: usize) -> Self {
        self.max_stderr_bytes = bytes;
        self
    }

    /// Override how long stderr is drained after exit
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    fn command(&self, plan: &CommandPlan) -> io::Result<TokioCommand> {
        let stdout = match plan.output_redirect {
            Some(ref path) => Stdio::from(std::fs::File::create(path).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("cannot create output file {}: {}", path.display(), e),
                )
            })?),
            None => Stdio::null(),
        };

        let mut process = TokioCommand::new(&plan.executable);
        process
            .args(&plan.args)
            .current_dir(&plan.working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // New process group so the timeout can signal every descendant
        #[cfg(unix)]
        process.process_group(0);

        Ok(process)
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, plan: &CommandPlan, timeout: ExecutionTimeout) -> ProcessOutcome {
        let started_at = SystemTime::now();
        let started = Instant::now();
        info!(operation = %plan.operation, command = %plan.display_command(), "Executing");

        let mut child = match self.command(plan).and_then(|mut c| c.spawn()) {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to launch {}: {}", plan.executable.display(), e);
                warn!(operation = %plan.operation, "{}", message);
                return ProcessOutcome::not_started(message, started_at, started);
            }
        };

        let pid = child.id();
        debug!(operation = %plan.operation, pid = ?pid, "Process started");

        let mut stderr_pipe = child.stderr.take();
        let mut tail = TailBuffer::new(self.max_stderr_bytes);

        let waited = timeout
            .run(wait_draining(&mut child, stderr_pipe.as_mut(), &mut tail))
            .await;

        let (status, timed_out) = match waited {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                warn!(operation = %plan.operation, error = %e, "Failed to wait for process");
                tail.push(format!("failed to wait for process: {e}").as_bytes());
                (None, false)
            }
            Err(elapsed) => {
                warn!(
                    operation = %plan.operation,
                    pid = ?pid,
                    "Timed out after {:?}, killing process group",
                    elapsed.0
                );
                kill_process_group(pid);
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Child already gone");
                }
                (child.wait().await.ok(), true)
            }
        };

        let duration = started.elapsed();

        if let Some(pipe) = stderr_pipe.as_mut() {
            if !tail.eof
                && tokio::time::timeout(self.drain_grace, tail.fill(pipe))
                    .await
                    .is_err()
            {
                debug!(operation = %plan.operation, "Stopped draining stderr after grace period");
            }
        }

        let (exit_code, signal) = status.map(exit_parts).unwrap_or((None, None));
        debug!(
            operation = %plan.operation,
            exit_code = ?exit_code,
            signal = ?signal,
            timed_out,
            duration_ms = duration.as_millis() as u64,
            "Process finished"
        );

        ProcessOutcome {
            exit_code,
            signal,
            started_at,
            stderr_truncated: tail.truncated,
            stderr: tail.into_string(),
            duration,
            timed_out,
        }
    }
}

/// Wait for exit while draining stderr so the child never blocks on a full pipe
async fn wait_draining<R>(
    child: &mut Child,
    stderr: Option<&mut R>,
    tail: &mut TailBuffer,
) -> io::Result<ExitStatus>
where
    R: AsyncRead + Unpin,
{
    let Some(stderr) = stderr else {
        return child.wait().await;
    };

    let wait = child.wait();
    tokio::pin!(wait);
    tokio::select! {
        status = &mut wait => status,
        () = tail.fill(stderr) => wait.await,
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal; the group id is the child's pid
        // because it was spawned with process_group(0).
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!(pid, error = %io::Error::last_os_error(), "killpg failed");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code(), status.signal())
}

#[cfg(not(unix))]
fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

/// Keeps the last `limit` bytes written to it
#[derive(Debug)]
struct TailBuffer {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
    eof: bool,
}

impl TailBuffer {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
            eof: false,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.limit {
            let excess = self.buf.len() - self.limit;
            self.buf.drain(..excess);
            self.truncated = true;
        }
    }

    /// Read until EOF. Cancel-safe: bytes already read stay in the buffer.
    async fn fill<R: AsyncRead + Unpin>(&mut self, reader: &mut R) {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => self.push(&chunk[..n]),
            }
        }
        self.eof = true;
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::catalog::OperationId;
    use std::path::PathBuf;

    fn shell_plan(dir: &std::path::Path, script: &str, redirect: bool) -> CommandPlan {
        let out = dir.join("out.sam");
        CommandPlan {
            operation: OperationId::Mem,
            executable: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
            working_dir: dir.to_path_buf(),
            output_redirect: redirect.then(|| out.clone()),
            expected_output: out.clone(),
            artifacts: vec![out],
            notes: vec![],
        }
    }

    #[tokio::test]
    async fn test_stdout_redirected_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let plan = shell_plan(dir.path(), "echo '@HD\tVN:1.6'; echo progress >&2", true);

        let outcome = TokioProcessRunner::new()
            .run(&plan, ExecutionTimeout::from_secs(10))
            .await;

        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.timed_out);
        assert_eq!(outcome.stderr, "progress\n");
        let written = std::fs::read_to_string(dir.path().join("out.sam")).unwrap();
        assert_eq!(written, "@HD\tVN:1.6\n");
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let plan = shell_plan(dir.path(), "touch marker", false);

        let outcome = TokioProcessRunner::new()
            .run(&plan, ExecutionTimeout::from_secs(10))
            .await;

        assert_eq!(outcome.exit_code, Some(0));
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let plan = shell_plan(dir.path(), "echo 'fail to open file' >&2; exit 3", true);

        let outcome = TokioProcessRunner::new()
            .run(&plan, ExecutionTimeout::from_secs(10))
            .await;

        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.signal, None);
        assert!(outcome.stderr.contains("fail to open file"));
        assert!(!outcome.launch_failed());
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = shell_plan(dir.path(), "true", false);
        plan.executable = dir.path().join("no-such-bwa");

        let outcome = TokioProcessRunner::new()
            .run(&plan, ExecutionTimeout::from_secs(10))
            .await;

        assert!(outcome.launch_failed());
        assert!(outcome.stderr.contains("failed to launch"));
    }

    #[tokio::test]
    async fn test_unwritable_output_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = shell_plan(dir.path(), "true", true);
        plan.output_redirect = Some(dir.path().join("missing-dir").join("out.sam"));

        let outcome = TokioProcessRunner::new()
            .run(&plan, ExecutionTimeout::from_secs(10))
            .await;

        assert!(outcome.launch_failed());
        assert!(outcome.stderr.contains("cannot create output file"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let plan = shell_plan(dir.path(), "echo started >&2; sleep 30", false);

        let start = Instant::now();
        let outcome = TokioProcessRunner::new()
            .run(&plan, ExecutionTimeout::new(Duration::from_millis(300)))
            .await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.signal, Some(libc::SIGKILL));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(outcome.stderr.contains("started"));
    }

    #[tokio::test]
    async fn test_signal_death_reported() {
        let dir = tempfile::tempdir().unwrap();
        let plan = shell_plan(dir.path(), "kill -9 $$", false);

        let outcome = TokioProcessRunner::new()
            .run(&plan, ExecutionTimeout::from_secs(10))
            .await;

        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.signal, Some(9));
        assert!(!outcome.launch_failed());
    }

    #[tokio::test]
    async fn test_stderr_keeps_tail() {
        let dir = tempfile::tempdir().unwrap();
        let plan = shell_plan(
            dir.path(),
            "i=0; while [ $i -lt 200 ]; do echo line$i >&2; i=$((i+1)); done",
            false,
        );

        let outcome = TokioProcessRunner::new()
            .with_max_stderr_bytes(64)
            .run(&plan, ExecutionTimeout::from_secs(10))
            .await;

        assert!(outcome.stderr_truncated);
        assert!(outcome.stderr.len() <= 64);
        assert!(outcome.stderr.ends_with("line199\n"));
    }

    #[tokio::test]
    async fn test_background_holder_does_not_stall() {
        let dir = tempfile::tempdir().unwrap();
        // The grandchild inherits stderr and outlives the shell
        let plan = shell_plan(dir.path(), "sleep 5 & echo done >&2", false);

        let start = Instant::now();
        let outcome = TokioProcessRunner::new()
            .with_drain_grace(Duration::from_millis(200))
            .run(&plan, ExecutionTimeout::from_secs(10))
            .await;

        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.stderr.contains("done"));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_tail_buffer() {
        let mut tail = TailBuffer::new(4);
        tail.push(b"ab");
        assert!(!tail.truncated);
        tail.push(b"cdef");
        assert!(tail.truncated);
        assert_eq!(tail.into_string(), "cdef");
    }
}
