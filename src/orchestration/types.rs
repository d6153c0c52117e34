//! Type definitions for the job orchestration subsystem.
//!
//! These types form the shared vocabulary between the
//! [`super::registry::JobRegistry`], the process and task runners, the await
//! engine, and the tool dispatch layer. All result types derive
//! [`serde::Serialize`] for JSON tool responses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a job (background process or sub-agent task).
///
/// Uses UUID v4 strings for collision-free IDs that are readable in logs and
/// tool output.
pub type JobId = String;

/// Identity of the workspace/session that owns a job.
///
/// Supplied by the tool-call layer on every invocation and checked by the
/// termination service before a job may be cancelled.
pub type ScopeId = String;

/// The two kinds of background work tracked by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A detached OS-level shell command.
    Process,
    /// A recursive sub-agent unit of work.
    Task,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Process => write!(f, "process"),
            JobKind::Task => write!(f, "task"),
        }
    }
}

/// Lifecycle status of a job.
///
/// Tasks move `queued -> running -> completed | error`; processes start at
/// `running` and move to `exited` or `killed`. Any non-terminal state can be
/// forced to `terminated` by the termination service. Terminal states are
/// never left once entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted but not yet dispatched (tasks only).
    Queued,
    /// Currently executing.
    Running,
    /// Task finished successfully.
    Completed,
    /// Task sub-agent failed, or a process could not be spawned.
    Error,
    /// Process exited on its own; `exit_code` is recorded.
    Exited,
    /// Process was killed by the termination service.
    Killed,
    /// Task was cancelled by the termination service.
    Terminated,
}

impl JobStatus {
    /// Whether no further transition can be observed from this status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Exited => "exited",
            JobStatus::Killed => "killed",
            JobStatus::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Kind-specific payload carried alongside the shared job envelope.
///
/// Shared services (registry, await, termination, listing) operate on the
/// envelope only; the runners are the only code that touches these fields.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobDetail {
    /// A detached shell command (passed to `sh -c`).
    Process { script: String },

    /// A sub-agent invocation with its instruction text and classification
    /// (e.g. "explore", "exec").
    Task { prompt: String, agent_type: String },
}

impl JobDetail {
    pub fn kind(&self) -> JobKind {
        match self {
            JobDetail::Process { .. } => JobKind::Process,
            JobDetail::Task { .. } => JobKind::Task,
        }
    }
}

/// Read-only view of a job, returned by registry queries.
///
/// This is a snapshot -- the underlying entry may change after the clone is
/// returned. Timestamps are ISO 8601 strings.
#[derive(Clone, Debug, Serialize)]
pub struct JobSnapshot {
    /// Unique identifier (UUID v4 string).
    pub id: JobId,
    /// Kind-specific payload.
    pub detail: JobDetail,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Owning workspace/session identity.
    pub scope: ScopeId,
    /// Parent task ID, or `None` for root jobs. Processes never have one.
    pub parent_id: Option<JobId>,
    /// Nesting depth in the task tree (root = 0).
    pub depth: usize,
    /// Optional human label.
    pub title: Option<String>,
    /// When the job was registered.
    pub created_at: String,
    /// When the job reached a terminal status.
    pub completed_at: Option<String>,
    /// Process exit code, recorded on `exited`/`killed`. For signal-killed
    /// processes the shell convention `128 + signal` is used.
    pub exit_code: Option<i32>,
    /// Final sub-agent summary, set when a task reaches `completed`.
    pub report_markdown: Option<String>,
    /// Failure description, set on `error`.
    pub error_message: Option<String>,
}

impl JobSnapshot {
    pub fn kind(&self) -> JobKind {
        self.detail.kind()
    }
}

/// Immutable fields supplied by a runner when registering a job.
#[derive(Clone, Debug)]
pub struct NewJob {
    pub id: JobId,
    pub detail: JobDetail,
    pub scope: ScopeId,
    pub parent_id: Option<JobId>,
    pub title: Option<String>,
    /// `queued` for tasks, `running` for processes.
    pub initial_status: JobStatus,
}

/// Result returned directly by a foreground (`run_in_background: false`)
/// task spawn. No polling is needed; the job is terminal by the time the
/// caller sees this.
#[derive(Clone, Debug, Serialize)]
pub struct SyncResult {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Per-job status reported by the await engine.
///
/// Mirrors [`JobStatus`] plus `not_found` for IDs unknown to the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResultStatus {
    NotFound,
    Queued,
    Running,
    Completed,
    Error,
    Exited,
    Killed,
    Terminated,
}

impl From<JobStatus> for JobResultStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => JobResultStatus::Queued,
            JobStatus::Running => JobResultStatus::Running,
            JobStatus::Completed => JobResultStatus::Completed,
            JobStatus::Error => JobResultStatus::Error,
            JobStatus::Exited => JobResultStatus::Exited,
            JobStatus::Killed => JobResultStatus::Killed,
            JobStatus::Terminated => JobResultStatus::Terminated,
        }
    }
}

/// Per-job outcome returned by the await engine.
///
/// Jobs still pending at the deadline carry their last observed non-terminal
/// status; a timeout is never an error of the call itself.
#[derive(Clone, Debug, Serialize)]
pub struct JobResult {
    pub id: JobId,
    pub status: JobResultStatus,
    /// Final summary for tasks that reached `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_markdown: Option<String>,
    /// Tail of captured output for processes that reached a terminal status.
    /// Read without consuming the job's output cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Per-item status of a termination request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStatus {
    /// Cancellation was delivered (or the job was already terminal).
    Terminated,
    /// The requested ID does not exist in the registry.
    NotFound,
    /// The job exists but belongs to a different scope than the caller.
    InvalidScope,
}

/// Outcome of terminating a single requested job.
#[derive(Clone, Debug, Serialize)]
pub struct TerminationResult {
    pub id: JobId,
    pub status: TerminationStatus,
    /// The requested ID plus every live descendant at the moment of
    /// cancellation. Empty for `not_found`/`invalid_scope`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub terminated_task_ids: Vec<JobId>,
}

/// Flat row returned by the listing service.
#[derive(Clone, Debug, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Shell command line (process jobs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Sub-agent classification (task jobs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<JobId>,
    pub depth: usize,
    pub created_at: String,
}

impl From<&JobSnapshot> for JobSummary {
    fn from(job: &JobSnapshot) -> Self {
        let (script, agent_type) = match &job.detail {
            JobDetail::Process { script } => (Some(script.clone()), None),
            JobDetail::Task { agent_type, .. } => (None, Some(agent_type.clone())),
        };
        JobSummary {
            id: job.id.clone(),
            kind: job.kind(),
            status: job.status,
            title: job.title.clone(),
            script,
            agent_type,
            parent_id: job.parent_id.clone(),
            depth: job.depth,
            created_at: job.created_at.clone(),
        }
    }
}
