//! Bounded-wait observation barrier over job completion.
//!
//! `await_jobs` blocks the caller until every requested job reaches a
//! terminal status or the timeout elapses, whichever comes first. It is a
//! pure observer: it never mutates a job, and concurrent waits on
//! overlapping ID sets do not interfere. Jobs still pending at the deadline
//! are reported with their last observed status -- partial completion is a
//! normal outcome of the call, never an error.
//!
//! The wait is driven by the registry's watch channel rather than a polling
//! timer: the waiter re-checks its predicate only when some job's status
//! actually changed.

use std::time::Duration;

use tokio::time::Instant;

use super::registry::JobRegistry;
use super::types::{JobId, JobKind, JobResult, JobResultStatus, JobSnapshot};

/// Lines of captured output included as a process job's result summary.
const SUMMARY_TAIL_LINES: usize = 20;

/// Which jobs an await call observes.
#[derive(Clone, Debug)]
pub enum AwaitSelector {
    /// An explicit ID set. Unknown IDs yield `not_found` results.
    Ids(Vec<JobId>),
    /// Every job that was non-terminal when the call started.
    AllActive,
}

/// Block until the selected jobs are terminal or the timeout elapses.
///
/// Returns one [`JobResult`] per requested ID, in request order. The call
/// completes within the requested timeout bound (plus scheduling slack) and
/// never blocks indefinitely.
pub async fn await_jobs(
    registry: &JobRegistry,
    selector: AwaitSelector,
    timeout_secs: f64,
) -> Vec<JobResult> {
    let ids = match selector {
        AwaitSelector::Ids(ids) => ids,
        AwaitSelector::AllActive => registry.active_ids(),
    };

    // Subscribe before the first check so no status change is missed
    // between the snapshot and the wait.
    let mut changes = registry.watch();
    let deadline = Instant::now() + sanitize_timeout(timeout_secs);

    loop {
        let all_settled = ids
            .iter()
            .all(|id| registry.get(id).is_none_or(|job| job.status.is_terminal()));
        if all_settled {
            break;
        }

        match tokio::time::timeout_at(deadline, changes.changed()).await {
            // A status changed somewhere; re-check the predicate.
            Ok(Ok(())) => continue,
            // Registry dropped: nothing further can change.
            Ok(Err(_)) => break,
            // Deadline reached: report whatever was last observed.
            Err(_) => break,
        }
    }

    ids.iter().map(|id| job_result(registry, id)).collect()
}

fn sanitize_timeout(timeout_secs: f64) -> Duration {
    if timeout_secs.is_finite() && timeout_secs > 0.0 {
        Duration::from_secs_f64(timeout_secs)
    } else {
        Duration::ZERO
    }
}

fn job_result(registry: &JobRegistry, id: &str) -> JobResult {
    let Some(job) = registry.get(id) else {
        return JobResult {
            id: id.to_string(),
            status: JobResultStatus::NotFound,
            report_markdown: None,
            output_tail: None,
            exit_code: None,
            error_message: None,
        };
    };

    let output_tail = summary_tail(registry, &job);
    JobResult {
        id: job.id.clone(),
        status: job.status.into(),
        report_markdown: job.report_markdown,
        output_tail,
        exit_code: job.exit_code,
        error_message: job.error_message,
    }
}

/// Non-consuming output summary for process jobs that have settled.
fn summary_tail(registry: &JobRegistry, job: &JobSnapshot) -> Option<String> {
    if job.kind() != JobKind::Process || !job.status.is_terminal() {
        return None;
    }
    registry
        .output_tail(&job.id, SUMMARY_TAIL_LINES)
        .map(|lines| lines.join("\n"))
}
