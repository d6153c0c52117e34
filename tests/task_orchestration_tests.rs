use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use overseer::orchestration::invoker::CommandInvoker;
use overseer::orchestration::list::{ListFilter, list_jobs};
use overseer::orchestration::registry::JobRegistry;
use overseer::orchestration::task::{SpawnedTask, TaskRequest, spawn_task};
use overseer::orchestration::terminate::terminate_jobs;
use overseer::orchestration::types::{JobKind, JobResultStatus, JobStatus, TerminationStatus};
use overseer::orchestration::wait::{AwaitSelector, await_jobs};

// ─── Helpers ──────────────────────────────────────────────────────────

fn test_registry() -> JobRegistry {
    JobRegistry::new(CancellationToken::new(), 3, 32)
}

/// Agent capability that echoes the prompt back as the report.
fn echo_agent(ws: &TempDir) -> Arc<CommandInvoker> {
    Arc::new(CommandInvoker::new("cat", ws.path()))
}

/// Agent capability that hangs until killed.
fn hanging_agent(ws: &TempDir) -> Arc<CommandInvoker> {
    Arc::new(CommandInvoker::new("sleep 60", ws.path()))
}

fn request(prompt: &str, background: bool, parent_id: Option<&str>) -> TaskRequest {
    TaskRequest {
        prompt: prompt.to_string(),
        agent_type: "exec".to_string(),
        title: None,
        run_in_background: background,
        parent_id: parent_id.map(|p| p.to_string()),
    }
}

async fn spawn_background(
    registry: &JobRegistry,
    invoker: Arc<CommandInvoker>,
    prompt: &str,
    parent_id: Option<&str>,
) -> String {
    match spawn_task(registry, invoker, request(prompt, true, parent_id), "ws".into())
        .await
        .unwrap()
    {
        SpawnedTask::Background(job) => job.id,
        SpawnedTask::Finished(_) => panic!("background spawn should return a handle"),
    }
}

// ============================================================
// Foreground tasks
// ============================================================

#[tokio::test]
async fn foreground_task_returns_report_without_polling() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();

    let spawned = spawn_task(
        &reg,
        echo_agent(&ws),
        request("## findings\nall good", false, None),
        "ws".into(),
    )
    .await
    .unwrap();

    let SpawnedTask::Finished(result) = spawned else {
        panic!("foreground spawn should finish synchronously");
    };
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.report_markdown.as_deref(), Some("## findings\nall good"));

    // No job is left non-terminal in the registry afterwards.
    for job in reg.snapshot_all() {
        assert!(job.status.is_terminal());
    }
}

#[tokio::test]
async fn foreground_task_reports_agent_failure_as_error() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();
    let failing = Arc::new(CommandInvoker::new("echo broken >&2; exit 7", ws.path()));

    let spawned = spawn_task(&reg, failing, request("anything", false, None), "ws".into())
        .await
        .unwrap();

    let SpawnedTask::Finished(result) = spawned else {
        panic!("foreground spawn should finish synchronously");
    };
    assert_eq!(result.status, JobStatus::Error);
    let message = result.error_message.unwrap();
    assert!(message.contains("7"), "unexpected message: {message}");
}

// ============================================================
// Background tasks
// ============================================================

#[tokio::test]
async fn background_task_completes_and_awaits() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();

    let id = spawn_background(&reg, echo_agent(&ws), "write the summary", None).await;

    let results = await_jobs(&reg, AwaitSelector::Ids(vec![id.clone()]), 10.0).await;
    assert_eq!(results[0].status, JobResultStatus::Completed);
    assert_eq!(results[0].report_markdown.as_deref(), Some("write the summary"));
}

#[tokio::test]
async fn await_timeout_reports_running_task() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();

    let id = spawn_background(&reg, hanging_agent(&ws), "hang", None).await;

    let start = std::time::Instant::now();
    let results = await_jobs(&reg, AwaitSelector::Ids(vec![id.clone()]), 0.3).await;
    assert!(start.elapsed() < Duration::from_secs(3));

    // Partial completion is a normal outcome: last observed status, no error.
    assert!(matches!(
        results[0].status,
        JobResultStatus::Queued | JobResultStatus::Running
    ));

    terminate_jobs(&reg, &[id.clone()], "ws");
    await_jobs(&reg, AwaitSelector::Ids(vec![id]), 10.0).await;
}

// ============================================================
// Cascading termination through the task tree
// ============================================================

#[tokio::test]
async fn terminating_a_parent_cascades_to_descendants() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();

    let t1 = spawn_background(&reg, hanging_agent(&ws), "parent work", None).await;
    let t2 = spawn_background(&reg, hanging_agent(&ws), "child work", Some(&t1)).await;

    let results = terminate_jobs(&reg, &[t1.clone()], "ws");
    assert_eq!(results[0].status, TerminationStatus::Terminated);

    let mut ids = results[0].terminated_task_ids.clone();
    ids.sort();
    let mut expected = vec![t1.clone(), t2.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    // Both jobs show terminated in a subsequent listing.
    let rows = list_jobs(&reg, &ListFilter::default());
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.status, JobStatus::Terminated);
    }
    // Parent precedes child.
    assert_eq!(rows[0].id, t1);
    assert_eq!(rows[1].id, t2);
}

#[tokio::test]
async fn sibling_subtree_survives_cousin_termination() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();

    let root = spawn_background(&reg, hanging_agent(&ws), "root", None).await;
    let left = spawn_background(&reg, hanging_agent(&ws), "left", Some(&root)).await;
    let right = spawn_background(&reg, hanging_agent(&ws), "right", Some(&root)).await;

    let results = terminate_jobs(&reg, &[left.clone()], "ws");
    assert_eq!(results[0].terminated_task_ids, vec![left.clone()]);

    assert_eq!(reg.get(&left).unwrap().status, JobStatus::Terminated);
    assert!(!reg.get(&right).unwrap().status.is_terminal());
    assert!(!reg.get(&root).unwrap().status.is_terminal());

    terminate_jobs(&reg, &[root.clone()], "ws");
    await_jobs(&reg, AwaitSelector::AllActive, 10.0).await;
}

#[tokio::test]
async fn batch_termination_tolerates_per_item_failures() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();

    let mine = spawn_background(&reg, hanging_agent(&ws), "mine", None).await;

    let results = terminate_jobs(&reg, &[mine.clone(), "unknown-id".to_string()], "ws");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, TerminationStatus::Terminated);
    assert_eq!(results[1].id, "unknown-id");
    assert_eq!(results[1].status, TerminationStatus::NotFound);
    assert!(results[1].terminated_task_ids.is_empty());
}

#[tokio::test]
async fn cross_scope_termination_is_distinguished_from_not_found() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();

    let theirs = match spawn_task(
        &reg,
        hanging_agent(&ws),
        request("their work", true, None),
        "their-session".into(),
    )
    .await
    .unwrap()
    {
        SpawnedTask::Background(job) => job.id,
        SpawnedTask::Finished(_) => panic!("expected a handle"),
    };

    let results = terminate_jobs(&reg, &[theirs.clone(), "ghost".to_string()], "my-session");
    assert_eq!(results[0].status, TerminationStatus::InvalidScope);
    assert_eq!(results[1].status, TerminationStatus::NotFound);

    // The foreign job keeps running.
    assert!(!reg.get(&theirs).unwrap().status.is_terminal());

    terminate_jobs(&reg, &[theirs], "their-session");
    await_jobs(&reg, AwaitSelector::AllActive, 10.0).await;
}

// ============================================================
// Listing across kinds
// ============================================================

#[tokio::test]
async fn listing_filters_by_kind_and_status() {
    let ws = TempDir::new().unwrap();
    let reg = test_registry();

    let done = spawn_background(&reg, echo_agent(&ws), "quick", None).await;
    let hung = spawn_background(&reg, hanging_agent(&ws), "slow", None).await;
    await_jobs(&reg, AwaitSelector::Ids(vec![done.clone()]), 10.0).await;

    let tasks = list_jobs(
        &reg,
        &ListFilter {
            status: None,
            kind: Some(JobKind::Task),
        },
    );
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|row| row.agent_type.is_some()));

    let completed = list_jobs(
        &reg,
        &ListFilter {
            status: Some(JobStatus::Completed),
            kind: None,
        },
    );
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, done);

    terminate_jobs(&reg, &[hung], "ws");
    await_jobs(&reg, AwaitSelector::AllActive, 10.0).await;
}
