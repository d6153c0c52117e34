//! Central registry for background jobs.
//!
//! [`JobRegistry`] is the single source of truth for all spawned processes
//! and sub-agent tasks. It wraps a `HashMap` plus a parent->child index
//! behind `Arc<Mutex<..>>` for thread-safe access from the runners, the tool
//! dispatch layer, and any number of concurrent await/terminate callers.
//!
//! **Concurrency model:** `Arc<Mutex<HashMap>>` is chosen over `DashMap` to
//! avoid an extra dependency. Contention is negligible -- the registry is
//! accessed infrequently (spawn, status transition, query) with tens of
//! concurrent jobs at most. All mutation goes through the registry, and
//! terminal transitions are guarded: an update against an already-terminal
//! job is a no-op, never an error, so a natural completion racing an
//! in-flight termination cannot corrupt the recorded outcome.
//!
//! **Cancellation model:** Each entry holds a [`CancellationToken`] created
//! as a child of its parent's token (or the root token for root jobs).
//! Cancelling the root token cascades shutdown to every entry.
//!
//! **Wait/notify:** every status mutation bumps a `tokio::sync::watch`
//! version channel; the await engine subscribes to it instead of polling.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::output::OutputBuffer;
use super::types::{
    JobDetail, JobId, JobKind, JobSnapshot, JobStatus, NewJob, ScopeId, TerminationResult,
    TerminationStatus,
};
use crate::error::RegistryError;

/// How long `shutdown_all` waits on each monitor task before giving up.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Mutable job record stored behind the registry lock.
struct JobRecord {
    id: JobId,
    detail: JobDetail,
    status: JobStatus,
    scope: ScopeId,
    parent_id: Option<JobId>,
    depth: usize,
    /// Registry-assigned insertion sequence, used for hierarchy-stable
    /// listing order.
    seq: u64,
    title: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    report_markdown: Option<String>,
    error_message: Option<String>,
}

impl JobRecord {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            detail: self.detail.clone(),
            status: self.status,
            scope: self.scope.clone(),
            parent_id: self.parent_id.clone(),
            depth: self.depth,
            title: self.title.clone(),
            created_at: self.created_at.to_rfc3339(),
            completed_at: self.completed_at.map(|t| t.to_rfc3339()),
            exit_code: self.exit_code,
            report_markdown: self.report_markdown.clone(),
            error_message: self.error_message.clone(),
        }
    }

    /// Move to `status`, stamping `completed_at` on terminal transitions.
    fn transition(&mut self, status: JobStatus) {
        self.status = status;
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Internal entry stored in the registry. Not exposed publicly -- callers
/// see [`JobSnapshot`] views via `get` / `children_of` / `snapshot_all`.
struct JobEntry {
    record: JobRecord,
    /// Cancellation token for this entry (child of parent's or root token).
    cancel_token: CancellationToken,
    /// JoinHandle for the spawned monitor task, retained for cleanup.
    join_handle: Option<JoinHandle<()>>,
    /// Captured output (process jobs only).
    output: Option<Arc<OutputBuffer>>,
    /// Stdin handle for process jobs (taken on each write).
    stdin: Option<tokio::process::ChildStdin>,
}

struct RegistryInner {
    entries: HashMap<JobId, JobEntry>,
    /// Parent ID -> child IDs in insertion order. Maintained on insert and
    /// prune; descendant discovery for cascade termination traverses this.
    children: HashMap<JobId, Vec<JobId>>,
    next_seq: u64,
}

/// Central registry for all background jobs.
///
/// Designed to be cloned freely: all state is behind `Arc`, so the runners,
/// the tool dispatch layer, and the host each hold a handle to the same
/// registry.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    root_cancel_token: CancellationToken,
    version: Arc<watch::Sender<u64>>,
    max_depth: usize,
    max_jobs: usize,
}

impl JobRegistry {
    /// Create a new registry with the given cancellation root and limits.
    ///
    /// - `root_cancel_token`: top-level token; cancelling it shuts down all jobs.
    /// - `max_depth`: maximum task nesting depth (root = 0).
    /// - `max_jobs`: maximum total tracked entries, bounding recursive fan-out.
    pub fn new(root_cancel_token: CancellationToken, max_depth: usize, max_jobs: usize) -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                entries: HashMap::new(),
                children: HashMap::new(),
                next_seq: 0,
            })),
            root_cancel_token,
            version: Arc::new(version),
            max_depth,
            max_jobs,
        }
    }

    /// Register a new job.
    ///
    /// Validates capacity, duplicate IDs, and -- when `parent_id` is set --
    /// that the parent is a live task in the same scope and that the computed
    /// depth stays within the limit. Depth is assigned here, once, from the
    /// parent entry; it is never recomputed or mutated afterwards.
    ///
    /// Returns the initial snapshot together with the job's cancellation
    /// token (a child of the parent's token, or of the root token).
    pub fn create(&self, new: NewJob) -> Result<(JobSnapshot, CancellationToken), RegistryError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.entries.len() >= self.max_jobs {
            return Err(RegistryError::Capacity {
                count: inner.entries.len(),
                limit: self.max_jobs,
            });
        }
        if inner.entries.contains_key(&new.id) {
            return Err(RegistryError::DuplicateId(new.id));
        }

        let (depth, parent_token) = match &new.parent_id {
            Some(pid) => {
                let parent = inner
                    .entries
                    .get(pid)
                    .ok_or_else(|| RegistryError::ParentNotFound(pid.clone()))?;
                if parent.record.detail.kind() != JobKind::Task {
                    return Err(RegistryError::ParentNotTask(pid.clone()));
                }
                if parent.record.status.is_terminal() {
                    return Err(RegistryError::ParentNotLive(pid.clone()));
                }
                if parent.record.scope != new.scope {
                    return Err(RegistryError::ParentScopeMismatch(pid.clone()));
                }
                (parent.record.depth + 1, parent.cancel_token.clone())
            }
            None => (0, self.root_cancel_token.clone()),
        };

        if depth > self.max_depth {
            return Err(RegistryError::DepthExceeded {
                depth,
                limit: self.max_depth,
            });
        }

        let cancel_token = parent_token.child_token();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let record = JobRecord {
            id: new.id.clone(),
            detail: new.detail,
            status: new.initial_status,
            scope: new.scope,
            parent_id: new.parent_id.clone(),
            depth,
            seq,
            title: new.title,
            created_at: Utc::now(),
            completed_at: None,
            exit_code: None,
            report_markdown: None,
            error_message: None,
        };
        let snapshot = record.snapshot();

        if let Some(pid) = &new.parent_id {
            inner
                .children
                .entry(pid.clone())
                .or_default()
                .push(new.id.clone());
        }
        inner.entries.insert(
            new.id,
            JobEntry {
                record,
                cancel_token: cancel_token.clone(),
                join_handle: None,
                output: None,
                stdin: None,
            },
        );

        drop(inner);
        self.bump_version();
        Ok((snapshot, cancel_token))
    }

    /// Get a snapshot of a job. Returns `None` if not found.
    pub fn get(&self, id: &str) -> Option<JobSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(id).map(|e| e.record.snapshot())
    }

    /// Attach a JoinHandle for later cleanup/await.
    pub fn set_join_handle(&self, id: &str, handle: JoinHandle<()>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(id) {
            entry.join_handle = Some(handle);
        }
    }

    /// Attach the captured-output buffer for a process job.
    pub fn attach_output(&self, id: &str, buffer: Arc<OutputBuffer>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(id) {
            entry.output = Some(buffer);
        }
    }

    /// Attach the stdin handle for a process job.
    pub fn set_stdin(&self, id: &str, stdin: tokio::process::ChildStdin) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(id) {
            entry.stdin = Some(stdin);
        }
    }

    /// Update the lifecycle status of a job.
    ///
    /// Returns `true` if the transition was applied. Once a job is terminal
    /// no further transition is applied and `false` is returned -- this is
    /// the idempotence rule that serializes natural completion against an
    /// in-flight termination: the first writer wins.
    pub fn update_status(&self, id: &str, status: JobStatus) -> bool {
        let applied = {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.get_mut(id) {
                Some(entry) if !entry.record.status.is_terminal() => {
                    entry.record.transition(status);
                    true
                }
                _ => false,
            }
        };
        if applied {
            tracing::debug!(job_id = %id, status = %status, "job status changed");
            self.bump_version();
        }
        applied
    }

    /// Record a process job's terminal state and exit code atomically.
    ///
    /// No-op if the job is already terminal.
    pub fn finish_process(&self, id: &str, status: JobStatus, exit_code: Option<i32>) -> bool {
        let applied = {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.get_mut(id) {
                Some(entry) if !entry.record.status.is_terminal() => {
                    entry.record.transition(status);
                    entry.record.exit_code = exit_code;
                    true
                }
                _ => false,
            }
        };
        if applied {
            tracing::debug!(job_id = %id, status = %status, ?exit_code, "process finished");
            self.bump_version();
        }
        applied
    }

    /// Record a task job's terminal state, report, and error atomically.
    ///
    /// No-op if the job is already terminal.
    pub fn finish_task(
        &self,
        id: &str,
        status: JobStatus,
        report_markdown: Option<String>,
        error_message: Option<String>,
    ) -> bool {
        let applied = {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.get_mut(id) {
                Some(entry) if !entry.record.status.is_terminal() => {
                    entry.record.transition(status);
                    entry.record.report_markdown = report_markdown;
                    entry.record.error_message = error_message;
                    true
                }
                _ => false,
            }
        };
        if applied {
            tracing::debug!(job_id = %id, status = %status, "task finished");
            self.bump_version();
        }
        applied
    }

    /// Move a job to `error` with a failure description (spawn failures).
    pub fn fail_job(&self, id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        let applied = {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.get_mut(id) {
                Some(entry) if !entry.record.status.is_terminal() => {
                    entry.record.transition(JobStatus::Error);
                    entry.record.error_message = Some(message.clone());
                    true
                }
                _ => false,
            }
        };
        if applied {
            tracing::warn!(job_id = %id, %message, "job failed");
            self.bump_version();
        }
        applied
    }

    /// Return snapshots of the direct children of a job, in insertion order.
    pub fn children_of(&self, id: &str) -> Vec<JobSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner
            .children
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|cid| inner.entries.get(cid))
                    .map(|e| e.record.snapshot())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Return snapshots of all tracked jobs in insertion order.
    pub fn snapshot_all(&self) -> Vec<JobSnapshot> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<(u64, JobSnapshot)> = inner
            .entries
            .values()
            .map(|e| (e.record.seq, e.record.snapshot()))
            .collect();
        jobs.sort_by_key(|(seq, _)| *seq);
        jobs.into_iter().map(|(_, job)| job).collect()
    }

    /// IDs of all non-terminal jobs, in insertion order.
    pub fn active_ids(&self) -> Vec<JobId> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<(u64, JobId)> = inner
            .entries
            .values()
            .filter(|e| !e.record.status.is_terminal())
            .map(|e| (e.record.seq, e.record.id.clone()))
            .collect();
        ids.sort_by_key(|(seq, _)| *seq);
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Total number of tracked entries.
    pub fn total_count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Output buffer plus current snapshot for a process job.
    ///
    /// `None` when the ID is unknown, is not a process, or has no buffer
    /// attached yet.
    pub fn process_output(&self, id: &str) -> Option<(Arc<OutputBuffer>, JobSnapshot)> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.entries.get(id)?;
        if entry.record.detail.kind() != JobKind::Process {
            return None;
        }
        let buffer = entry.output.as_ref()?.clone();
        Some((buffer, entry.record.snapshot()))
    }

    /// Last `n` captured output lines of a process job, non-consuming.
    pub fn output_tail(&self, id: &str, n: usize) -> Option<Vec<String>> {
        let buffer = {
            let inner = self.inner.lock().unwrap();
            inner.entries.get(id)?.output.as_ref()?.clone()
        };
        Some(buffer.tail(n))
    }

    /// Write data to a process job's stdin without consuming the handle.
    ///
    /// Temporarily takes the `ChildStdin` out of the entry, writes outside
    /// the lock, and puts the handle back so later writes still work.
    pub async fn write_stdin(&self, id: &str, data: &[u8]) -> Result<usize, String> {
        let stdin_opt = {
            let mut inner = self.inner.lock().unwrap();
            inner.entries.get_mut(id).and_then(|e| e.stdin.take())
        };

        let mut stdin = stdin_opt.ok_or_else(|| {
            "No stdin handle available (process not found or stdin already closed)".to_string()
        })?;

        use tokio::io::AsyncWriteExt;
        let write_result = stdin.write_all(data).await;

        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(entry) = inner.entries.get_mut(id) {
                entry.stdin = Some(stdin);
            }
            // If the entry was pruned while writing, the handle is dropped.
        }

        match write_result {
            Ok(()) => Ok(data.len()),
            Err(e) => Err(format!("Failed to write to stdin: {e}")),
        }
    }

    /// Terminate one job, cascading through its live descendants.
    ///
    /// The descendant set is discovered and marked under a single lock
    /// acquisition, so the reported `terminated_task_ids` is a consistent
    /// snapshot: the requested ID plus every descendant that was live at the
    /// moment of cancellation, no duplicates, no omissions. Marking queued
    /// tasks `terminated` here (not in their monitor) guarantees a cancelled
    /// queued task can never start.
    ///
    /// Task jobs are moved to `terminated` immediately. Process jobs only
    /// have their token cancelled: the acknowledgment is signal delivery,
    /// and the job's own `killed` status is recorded by its monitor once the
    /// OS reports the actual exit.
    pub(crate) fn cascade_terminate(&self, id: &str, caller_scope: &str) -> TerminationResult {
        let (result, changed) = {
            let mut inner = self.inner.lock().unwrap();

            let Some(entry) = inner.entries.get(id) else {
                return TerminationResult {
                    id: id.to_string(),
                    status: TerminationStatus::NotFound,
                    terminated_task_ids: Vec::new(),
                };
            };
            if entry.record.scope != caller_scope {
                return TerminationResult {
                    id: id.to_string(),
                    status: TerminationStatus::InvalidScope,
                    terminated_task_ids: Vec::new(),
                };
            }
            if entry.record.status.is_terminal() {
                // Idempotent: re-terminating reports only the job itself.
                return TerminationResult {
                    id: id.to_string(),
                    status: TerminationStatus::Terminated,
                    terminated_task_ids: vec![id.to_string()],
                };
            }

            // Breadth-first descendant discovery over the child index.
            let mut affected = vec![id.to_string()];
            let mut queue: VecDeque<JobId> =
                inner.children.get(id).cloned().unwrap_or_default().into();
            while let Some(cid) = queue.pop_front() {
                if let Some(child) = inner.entries.get(&cid) {
                    if !child.record.status.is_terminal() {
                        affected.push(cid.clone());
                    }
                    // Descend regardless: a terminal child may still have
                    // live descendants if it was cancelled mid-spawn.
                    queue.extend(inner.children.get(&cid).cloned().unwrap_or_default());
                }
            }

            for aid in &affected {
                let Some(entry) = inner.entries.get_mut(aid) else {
                    continue;
                };
                entry.cancel_token.cancel();
                if entry.record.detail.kind() == JobKind::Task
                    && !entry.record.status.is_terminal()
                {
                    entry.record.transition(JobStatus::Terminated);
                }
            }

            (
                TerminationResult {
                    id: id.to_string(),
                    status: TerminationStatus::Terminated,
                    terminated_task_ids: affected,
                },
                true,
            )
        };

        if changed {
            tracing::info!(
                job_id = %id,
                affected = result.terminated_task_ids.len(),
                "terminated job tree"
            );
            self.bump_version();
        }
        result
    }

    /// Remove terminal jobs whose retention window has elapsed.
    ///
    /// A job is never removed while it still has children in the registry,
    /// so a live job's `parent_id` always stays resolvable. Candidates are
    /// processed deepest-first, letting an expired child and parent go in
    /// the same sweep. Returns the number of removed entries.
    pub fn prune_expired(&self, retention: Duration) -> usize {
        let retention =
            chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();

        let mut candidates: Vec<(JobId, usize)> = inner
            .entries
            .values()
            .filter(|e| e.record.status.is_terminal())
            .filter(|e| {
                e.record
                    .completed_at
                    .is_some_and(|t| now.signed_duration_since(t) >= retention)
            })
            .map(|e| (e.record.id.clone(), e.record.depth))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        let mut removed = 0;
        for (id, _) in candidates {
            let has_children = inner.children.get(&id).is_some_and(|c| !c.is_empty());
            if has_children {
                continue;
            }
            if let Some(entry) = inner.entries.remove(&id) {
                if let Some(pid) = &entry.record.parent_id {
                    if let Some(siblings) = inner.children.get_mut(pid) {
                        siblings.retain(|cid| cid != &id);
                    }
                }
                inner.children.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    /// Periodically prune expired jobs until the root token is cancelled.
    pub fn spawn_retention_sweeper(
        &self,
        retention: Duration,
        interval: Duration,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        let token = self.root_cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = registry.prune_expired(retention);
                        if removed > 0 {
                            tracing::debug!(removed, "pruned expired jobs");
                        }
                    }
                }
            }
        })
    }

    /// Shut down all jobs: cancel the root token, then await all monitor
    /// JoinHandles with a per-handle timeout. Anything still non-terminal
    /// afterwards is marked `terminated`.
    pub async fn shutdown_all(&self) {
        self.root_cancel_token.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .entries
                .values_mut()
                .filter_map(|e| e.join_handle.take())
                .collect()
        };

        for handle in handles {
            let _ = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, handle).await;
        }

        {
            let mut inner = self.inner.lock().unwrap();
            for entry in inner.entries.values_mut() {
                if !entry.record.status.is_terminal() {
                    entry.record.transition(JobStatus::Terminated);
                }
            }
        }
        self.bump_version();
    }

    /// Subscribe to the status-change version channel.
    ///
    /// The receiver observes a new version after every status mutation, so a
    /// waiter can re-check its predicate instead of polling on a timer.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to create a registry with standard test limits.
    fn test_registry() -> JobRegistry {
        JobRegistry::new(CancellationToken::new(), 3, 10)
    }

    fn task_job(id: &str, parent_id: Option<&str>) -> NewJob {
        NewJob {
            id: id.to_string(),
            detail: JobDetail::Task {
                prompt: "do the thing".to_string(),
                agent_type: "exec".to_string(),
            },
            scope: "ws".to_string(),
            parent_id: parent_id.map(|p| p.to_string()),
            title: None,
            initial_status: JobStatus::Queued,
        }
    }

    fn process_job(id: &str) -> NewJob {
        NewJob {
            id: id.to_string(),
            detail: JobDetail::Process {
                script: "sleep 10".to_string(),
            },
            scope: "ws".to_string(),
            parent_id: None,
            title: None,
            initial_status: JobStatus::Running,
        }
    }

    #[test]
    fn create_succeeds_within_limits() {
        let reg = test_registry();
        let (snapshot, _token) = reg.create(task_job("t1", None)).unwrap();
        assert_eq!(snapshot.status, JobStatus::Queued);
        assert_eq!(snapshot.depth, 0);
        assert_eq!(reg.total_count(), 1);
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let reg = test_registry();
        reg.create(task_job("dup", None)).unwrap();
        let err = reg.create(task_job("dup", None)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(_)));
    }

    #[test]
    fn create_rejects_when_capacity_reached() {
        let reg = JobRegistry::new(CancellationToken::new(), 3, 2);
        reg.create(task_job("a", None)).unwrap();
        reg.create(task_job("b", None)).unwrap();
        let err = reg.create(task_job("c", None)).unwrap_err();
        assert!(matches!(err, RegistryError::Capacity { .. }));
    }

    #[test]
    fn create_computes_depth_and_enforces_limit() {
        let reg = JobRegistry::new(CancellationToken::new(), 1, 10);
        reg.create(task_job("root", None)).unwrap();
        let (child, _) = reg.create(task_job("child", Some("root"))).unwrap();
        assert_eq!(child.depth, 1);

        let err = reg
            .create(task_job("grandchild", Some("child")))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DepthExceeded { .. }));
    }

    #[test]
    fn create_rejects_missing_parent() {
        let reg = test_registry();
        let err = reg.create(task_job("orphan", Some("ghost"))).unwrap_err();
        assert!(matches!(err, RegistryError::ParentNotFound(_)));
    }

    #[test]
    fn create_rejects_process_parent() {
        let reg = test_registry();
        reg.create(process_job("p1")).unwrap();
        let err = reg.create(task_job("t1", Some("p1"))).unwrap_err();
        assert!(matches!(err, RegistryError::ParentNotTask(_)));
    }

    #[test]
    fn create_rejects_terminal_parent() {
        let reg = test_registry();
        reg.create(task_job("parent", None)).unwrap();
        reg.finish_task("parent", JobStatus::Completed, Some("done".into()), None);
        let err = reg.create(task_job("late", Some("parent"))).unwrap_err();
        assert!(matches!(err, RegistryError::ParentNotLive(_)));
    }

    #[test]
    fn create_rejects_cross_scope_parent() {
        let reg = test_registry();
        reg.create(task_job("parent", None)).unwrap();
        let mut foreign = task_job("intruder", Some("parent"));
        foreign.scope = "other".to_string();
        let err = reg.create(foreign).unwrap_err();
        assert!(matches!(err, RegistryError::ParentScopeMismatch(_)));
    }

    #[test]
    fn root_cancel_cascades_to_child_tokens() {
        let root = CancellationToken::new();
        let reg = JobRegistry::new(root.clone(), 3, 10);
        let (_, token) = reg.create(task_job("t1", None)).unwrap();
        let (_, child_token) = reg.create(task_job("t2", Some("t1"))).unwrap();

        assert!(!token.is_cancelled());
        root.cancel();
        assert!(token.is_cancelled());
        assert!(child_token.is_cancelled());
    }

    #[test]
    fn update_status_is_noop_once_terminal() {
        let reg = test_registry();
        reg.create(task_job("t1", None)).unwrap();

        assert!(reg.update_status("t1", JobStatus::Running));
        assert!(reg.finish_task("t1", JobStatus::Completed, Some("ok".into()), None));

        // A racing termination or late monitor write must not win.
        assert!(!reg.update_status("t1", JobStatus::Terminated));
        assert!(!reg.finish_task("t1", JobStatus::Error, None, Some("late".into())));

        let job = reg.get("t1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.report_markdown.as_deref(), Some("ok"));
        assert!(job.error_message.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn finish_process_records_exit_code() {
        let reg = test_registry();
        reg.create(process_job("p1")).unwrap();
        assert!(reg.finish_process("p1", JobStatus::Exited, Some(0)));

        let job = reg.get("p1").unwrap();
        assert_eq!(job.status, JobStatus::Exited);
        assert_eq!(job.exit_code, Some(0));
    }

    #[test]
    fn children_of_returns_direct_children_in_order() {
        let reg = test_registry();
        reg.create(task_job("parent", None)).unwrap();
        reg.create(task_job("c1", Some("parent"))).unwrap();
        reg.create(task_job("c2", Some("parent"))).unwrap();
        reg.create(task_job("grandchild", Some("c1"))).unwrap();

        let children = reg.children_of("parent");
        let ids: Vec<&str> = children.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn cascade_terminate_reports_full_live_descendant_set() {
        let reg = test_registry();
        reg.create(task_job("t1", None)).unwrap();
        reg.create(task_job("t2", Some("t1"))).unwrap();
        reg.create(task_job("t3", Some("t2"))).unwrap();
        reg.create(task_job("other", None)).unwrap();

        let result = reg.cascade_terminate("t1", "ws");
        assert_eq!(result.status, TerminationStatus::Terminated);

        let mut ids = result.terminated_task_ids.clone();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);

        for id in ["t1", "t2", "t3"] {
            assert_eq!(reg.get(id).unwrap().status, JobStatus::Terminated);
        }
        // Unrelated jobs are untouched.
        assert_eq!(reg.get("other").unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn cascade_terminate_skips_already_terminal_descendants() {
        let reg = test_registry();
        reg.create(task_job("t1", None)).unwrap();
        reg.create(task_job("done", Some("t1"))).unwrap();
        reg.create(task_job("live", Some("t1"))).unwrap();
        reg.finish_task("done", JobStatus::Completed, None, None);

        let result = reg.cascade_terminate("t1", "ws");
        let mut ids = result.terminated_task_ids.clone();
        ids.sort();
        assert_eq!(ids, vec!["live", "t1"]);

        // The completed child keeps its recorded outcome.
        assert_eq!(reg.get("done").unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn cascade_terminate_is_idempotent() {
        let reg = test_registry();
        reg.create(task_job("t1", None)).unwrap();
        reg.create(task_job("t2", Some("t1"))).unwrap();

        let first = reg.cascade_terminate("t1", "ws");
        assert_eq!(first.terminated_task_ids.len(), 2);

        let second = reg.cascade_terminate("t1", "ws");
        assert_eq!(second.status, TerminationStatus::Terminated);
        assert_eq!(second.terminated_task_ids, vec!["t1".to_string()]);
    }

    #[test]
    fn cascade_terminate_unknown_id() {
        let reg = test_registry();
        let result = reg.cascade_terminate("ghost", "ws");
        assert_eq!(result.status, TerminationStatus::NotFound);
        assert!(result.terminated_task_ids.is_empty());
    }

    #[test]
    fn cascade_terminate_rejects_foreign_scope() {
        let reg = test_registry();
        reg.create(task_job("t1", None)).unwrap();

        let result = reg.cascade_terminate("t1", "someone-else");
        assert_eq!(result.status, TerminationStatus::InvalidScope);
        assert_eq!(reg.get("t1").unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn cascade_terminate_cancels_tokens() {
        let reg = test_registry();
        let (_, parent_token) = reg.create(task_job("t1", None)).unwrap();
        let (_, child_token) = reg.create(task_job("t2", Some("t1"))).unwrap();

        reg.cascade_terminate("t1", "ws");
        assert!(parent_token.is_cancelled());
        assert!(child_token.is_cancelled());
    }

    #[test]
    fn prune_removes_expired_terminal_jobs() {
        let reg = test_registry();
        reg.create(task_job("done", None)).unwrap();
        reg.create(task_job("live", None)).unwrap();
        reg.finish_task("done", JobStatus::Completed, None, None);

        let removed = reg.prune_expired(Duration::ZERO);
        assert_eq!(removed, 1);
        assert!(reg.get("done").is_none());
        assert!(reg.get("live").is_some());
    }

    #[test]
    fn prune_keeps_parents_of_live_children() {
        let reg = test_registry();
        reg.create(task_job("parent", None)).unwrap();
        reg.create(task_job("child", Some("parent"))).unwrap();
        // Parent terminal, child still live: parent must stay resolvable.
        reg.finish_task("parent", JobStatus::Error, None, Some("boom".into()));

        assert_eq!(reg.prune_expired(Duration::ZERO), 0);
        assert!(reg.get("parent").is_some());

        // Once the whole tree is terminal, one sweep removes child then parent.
        reg.finish_task("child", JobStatus::Completed, None, None);
        assert_eq!(reg.prune_expired(Duration::ZERO), 2);
        assert_eq!(reg.total_count(), 0);
    }

    #[test]
    fn prune_respects_retention_window() {
        let reg = test_registry();
        reg.create(task_job("done", None)).unwrap();
        reg.finish_task("done", JobStatus::Completed, None, None);

        // Completed moments ago: a generous window keeps it.
        assert_eq!(reg.prune_expired(Duration::from_secs(3600)), 0);
        assert!(reg.get("done").is_some());
    }

    #[test]
    fn watch_version_bumps_on_status_change() {
        let reg = test_registry();
        let rx = reg.watch();
        let before = *rx.borrow();

        reg.create(task_job("t1", None)).unwrap();
        reg.update_status("t1", JobStatus::Running);

        assert_ne!(*rx.borrow(), before);
    }

    #[tokio::test]
    async fn shutdown_all_marks_survivors_terminated() {
        let reg = test_registry();
        reg.create(task_job("t1", None)).unwrap();
        reg.update_status("t1", JobStatus::Running);

        reg.shutdown_all().await;
        assert_eq!(reg.get("t1").unwrap().status, JobStatus::Terminated);
    }
}
