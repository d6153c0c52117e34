//! The external agent-invocation collaborator.
//!
//! The orchestration engine only manages lifecycle; it does not implement
//! agent reasoning. [`AgentInvoker`] is the seam the surrounding host plugs
//! that capability into. [`CommandInvoker`] is the host's subprocess-backed
//! implementation: it runs a configured shell command with the task prompt
//! on stdin and treats stdout as the sub-agent's final report.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::types::JobId;
use crate::error::AgentError;

/// One unit of sub-agent work handed to the invoker.
#[derive(Clone, Debug)]
pub struct AgentInvocation {
    pub job_id: JobId,
    /// Instruction text for the sub-agent.
    pub prompt: String,
    /// Sub-agent classification (e.g. "explore", "exec").
    pub agent_type: String,
    /// Nesting depth of the spawning task, for the capability to bound its
    /// own recursion if it wants to.
    pub depth: usize,
}

/// Capability that turns an [`AgentInvocation`] into a markdown report.
///
/// Implementations run concurrently: the task runner may have any number of
/// invocations in flight. Cancellation is delivered by dropping the returned
/// future, so implementations must tie any spawned resources to it (e.g.
/// `kill_on_drop` on child processes).
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, invocation: AgentInvocation) -> Result<String, AgentError>;
}

/// Subprocess-backed invoker.
///
/// Runs `sh -c <command>` in the workspace directory with the prompt piped
/// to stdin and the invocation metadata in `OVERSEER_*` environment
/// variables. Stdout is the report; a non-zero exit is an agent failure.
pub struct CommandInvoker {
    command: String,
    workspace: PathBuf,
}

impl CommandInvoker {
    pub fn new(command: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl AgentInvoker for CommandInvoker {
    async fn invoke(&self, invocation: AgentInvocation) -> Result<String, AgentError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.workspace)
            .env("OVERSEER_JOB_ID", &invocation.job_id)
            .env("OVERSEER_AGENT_TYPE", &invocation.agent_type)
            .env("OVERSEER_DEPTH", invocation.depth.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AgentError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            // The agent command may exit without reading its stdin; a broken
            // pipe here is not a failure of the invocation.
            let _ = stdin.write_all(invocation.prompt.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let output = child.wait_with_output().await.map_err(AgentError::Spawn)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(AgentError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Placeholder invoker for hosts started without an agent capability.
///
/// Every invocation fails with [`AgentError::Unavailable`], which surfaces
/// as the task's terminal `error` state rather than a call-level failure.
pub struct UnavailableInvoker;

#[async_trait]
impl AgentInvoker for UnavailableInvoker {
    async fn invoke(&self, _invocation: AgentInvocation) -> Result<String, AgentError> {
        Err(AgentError::Unavailable)
    }
}
