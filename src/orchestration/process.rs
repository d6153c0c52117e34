//! Background process runner.
//!
//! Spawns a detached shell command as a tokio child with piped stdin,
//! stdout, and stderr. Output is captured into the job's append-only
//! [`OutputBuffer`] as it is produced, not just at exit, and read back
//! through the cursor-consuming [`read_output`].
//!
//! The spawned process:
//! - Runs in its own process group (`process_group(0)`) for clean kill
//! - Has `kill_on_drop(true)` as a safety net
//! - Respects its [`CancellationToken`] from the registry
//! - Reports `exited`/`killed` plus the exit code through the registry
//!
//! Non-zero exit codes are data, not errors: the job still reaches `exited`
//! and the code is recorded for callers to interpret.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use uuid::Uuid;

use super::output::{OutputBuffer, OutputFilter};
use super::registry::JobRegistry;
use super::types::{JobDetail, JobId, JobSnapshot, JobStatus, NewJob, ScopeId};
use crate::config::EngineConfig;
use crate::error::{OutputError, SpawnError};

/// How long the monitor waits for the pipe readers after process exit.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Slice of captured output returned by [`read_output`].
#[derive(Clone, Debug, serde::Serialize)]
pub struct OutputRead {
    pub id: JobId,
    /// Lines past the job's cursor that passed the filter. Empty when there
    /// has been no new output since the last read -- that is a normal
    /// result, not an error.
    pub lines: Vec<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Spawn a detached background shell process with output capture.
///
/// The process runs `sh -c <script>` in the workspace directory with its own
/// process group. Stdin is retained in the registry for later writes; stdout
/// and stderr are captured interleaved into the job's output buffer, stderr
/// lines prefixed with `[stderr] `.
///
/// The job is registered at `running` before the OS spawn; if the spawn
/// itself fails the job is moved to `error` with the failure recorded, and
/// the error is also returned to the caller.
pub async fn spawn_process(
    registry: &JobRegistry,
    script: String,
    title: Option<String>,
    scope: ScopeId,
    config: &EngineConfig,
) -> Result<JobSnapshot, SpawnError> {
    let id: JobId = Uuid::new_v4().to_string();

    let (snapshot, cancel_token) = registry.create(NewJob {
        id: id.clone(),
        detail: JobDetail::Process {
            script: script.clone(),
        },
        scope,
        parent_id: None,
        title,
        initial_status: JobStatus::Running,
    })?;

    // process_group(0) requires the CommandExt trait on Unix.
    #[allow(unused_imports)]
    use std::os::unix::process::CommandExt;

    let spawn_result = Command::new("sh")
        .arg("-c")
        .arg(&script)
        .current_dir(&config.workspace)
        .process_group(0)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawn_result {
        Ok(child) => child,
        Err(e) => {
            registry.fail_job(&id, format!("failed to spawn shell process: {e}"));
            return Err(SpawnError::Process(e));
        }
    };

    if let Some(stdin) = child.stdin.take() {
        registry.set_stdin(&id, stdin);
    }

    let output = Arc::new(OutputBuffer::new());
    registry.attach_output(&id, output.clone());

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let buf = output.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                buf.append(line);
            }
        }));
    }
    if let Some(stderr) = child.stderr.take() {
        let buf = output.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                buf.append(format!("[stderr] {line}"));
            }
        }));
    }

    let monitor_id = id.clone();
    let monitor_registry = registry.clone();
    let handle = tokio::spawn(async move {
        let (status, exit_status) = tokio::select! {
            wait_result = child.wait() => match wait_result {
                Ok(exit) => (JobStatus::Exited, Some(exit)),
                Err(e) => {
                    monitor_registry.fail_job(&monitor_id, format!("process wait failed: {e}"));
                    return;
                }
            },
            _ = cancel_token.cancelled() => {
                // Kill the entire process group, then reap to avoid zombies.
                if let Some(pid) = child.id() {
                    let pgid = nix::unistd::Pid::from_raw(pid as i32);
                    let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
                }
                match child.wait().await {
                    Ok(exit) => (JobStatus::Killed, Some(exit)),
                    Err(_) => (JobStatus::Killed, None),
                }
            }
        };

        // Drain the pipe readers before recording the terminal state, so a
        // read after observing `exited`/`killed` sees the complete output.
        // The timeout covers daemonized grandchildren that keep the pipe
        // open past the shell's exit.
        for reader in readers {
            let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await;
        }

        let exit_code = exit_status.and_then(exit_code_of);
        monitor_registry.finish_process(&monitor_id, status, exit_code);
    });

    registry.set_join_handle(&id, handle);
    tracing::info!(job_id = %id, script = %truncate(&script, 60), "spawned background process");

    Ok(snapshot)
}

/// Map an OS exit status to a recordable code: the plain code for normal
/// exits, `128 + signal` (the shell convention) for signal deaths.
fn exit_code_of(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|sig| 128 + sig))
}

/// Read the next slice of a process job's captured output.
///
/// Returns only output past the job's cursor and advances the cursor past
/// the full scanned span, so each captured line is delivered at most once.
/// `filter` restricts what is returned, never what is consumed. Fails with
/// [`OutputError::NotFound`] when `id` is unknown or not a process job.
pub fn read_output(
    registry: &JobRegistry,
    id: &str,
    filter: Option<&OutputFilter>,
) -> Result<OutputRead, OutputError> {
    let (buffer, job) = registry
        .process_output(id)
        .ok_or_else(|| OutputError::NotFound(id.to_string()))?;

    Ok(OutputRead {
        id: job.id,
        lines: buffer.consume(filter),
        status: job.status,
        exit_code: job.exit_code,
    })
}

/// Truncate a string to `max_len` characters, appending "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() > max_len {
        format!("{}...", &s[..max_len])
    } else {
        s.to_string()
    }
}
