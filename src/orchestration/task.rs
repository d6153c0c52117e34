//! Sub-agent task runner.
//!
//! Spawns a unit of sub-agent work through the host's [`AgentInvoker`]
//! capability. Background tasks return a handle immediately and are driven
//! by a monitor task; foreground tasks block the caller and hand back the
//! report directly, with no polling step.
//!
//! Tasks are the recursive kind of job: a task may spawn children by naming
//! itself as `parent_id`, and the registry validates liveness, scope, and
//! the configured depth limit at creation. Concurrent siblings are fully
//! independent.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::invoker::{AgentInvocation, AgentInvoker};
use super::registry::JobRegistry;
use super::types::{JobDetail, JobId, JobSnapshot, JobStatus, NewJob, ScopeId, SyncResult};
use crate::error::SpawnError;

/// Parameters for spawning a sub-agent task.
#[derive(Clone, Debug)]
pub struct TaskRequest {
    /// Instruction text handed to the sub-agent.
    pub prompt: String,
    /// Sub-agent classification (e.g. "explore", "exec").
    pub agent_type: String,
    /// Optional human label.
    pub title: Option<String>,
    /// When false, the spawn call blocks until the sub-agent finishes and
    /// returns its result synchronously instead of a handle.
    pub run_in_background: bool,
    /// Spawning task, for recursive sub-agents. Must be a live task in the
    /// caller's scope.
    pub parent_id: Option<JobId>,
}

/// What a task spawn produced: a background handle or a finished result.
#[derive(Clone, Debug)]
pub enum SpawnedTask {
    /// Background mode: the job was accepted at `queued` and runs on its own.
    Background(JobSnapshot),
    /// Foreground mode: the job is already terminal.
    Finished(SyncResult),
}

/// Spawn a sub-agent task.
///
/// The job is registered at `queued`. In background mode a monitor task
/// moves it to `running` once the invocation begins and records the terminal
/// outcome; in foreground mode the same lifecycle runs inline and the caller
/// receives a [`SyncResult`] -- `completed` or `error` are the only sync
/// outcomes short of a concurrent termination.
pub async fn spawn_task(
    registry: &JobRegistry,
    invoker: Arc<dyn AgentInvoker>,
    request: TaskRequest,
    scope: ScopeId,
) -> Result<SpawnedTask, SpawnError> {
    let id: JobId = Uuid::new_v4().to_string();

    let (snapshot, cancel_token) = registry.create(NewJob {
        id: id.clone(),
        detail: JobDetail::Task {
            prompt: request.prompt.clone(),
            agent_type: request.agent_type.clone(),
        },
        scope,
        parent_id: request.parent_id.clone(),
        title: request.title,
        initial_status: JobStatus::Queued,
    })?;

    let invocation = AgentInvocation {
        job_id: id.clone(),
        prompt: request.prompt,
        agent_type: request.agent_type,
        depth: snapshot.depth,
    };

    tracing::info!(
        job_id = %id,
        agent_type = %invocation.agent_type,
        depth = invocation.depth,
        background = request.run_in_background,
        "spawned sub-agent task"
    );

    if request.run_in_background {
        let handle = tokio::spawn(run_invocation(
            registry.clone(),
            invoker,
            id.clone(),
            invocation,
            cancel_token,
        ));
        registry.set_join_handle(&id, handle);
        Ok(SpawnedTask::Background(snapshot))
    } else {
        run_invocation(registry.clone(), invoker, id.clone(), invocation, cancel_token).await;
        Ok(SpawnedTask::Finished(sync_result(registry, &id)))
    }
}

/// Drive one invocation through the task lifecycle.
///
/// Shared between foreground (awaited inline) and background (spawned) mode.
/// The `queued -> running` transition goes through the registry's terminal
/// guard, so a task terminated while still queued never starts.
async fn run_invocation(
    registry: JobRegistry,
    invoker: Arc<dyn AgentInvoker>,
    id: JobId,
    invocation: AgentInvocation,
    cancel_token: CancellationToken,
) {
    if cancel_token.is_cancelled() {
        registry.finish_task(&id, JobStatus::Terminated, None, None);
        return;
    }
    if !registry.update_status(&id, JobStatus::Running) {
        // Already terminal: terminated between registration and dispatch.
        return;
    }

    tokio::select! {
        result = invoker.invoke(invocation) => match result {
            Ok(report) => {
                registry.finish_task(&id, JobStatus::Completed, Some(report), None);
            }
            Err(e) => {
                registry.finish_task(&id, JobStatus::Error, None, Some(e.to_string()));
            }
        },
        _ = cancel_token.cancelled() => {
            // The cascade usually records `terminated` first; this is the
            // backstop for a direct root-token cancel.
            registry.finish_task(&id, JobStatus::Terminated, None, None);
        }
    }
}

fn sync_result(registry: &JobRegistry, id: &str) -> SyncResult {
    match registry.get(id) {
        Some(job) => SyncResult {
            id: job.id,
            status: job.status,
            report_markdown: job.report_markdown,
            error_message: job.error_message,
        },
        None => SyncResult {
            id: id.to_string(),
            status: JobStatus::Error,
            report_markdown: None,
            error_message: Some("job record missing after invocation".to_string()),
        },
    }
}
