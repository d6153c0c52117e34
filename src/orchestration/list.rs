//! Read-only job listing with hierarchy-stable ordering.
//!
//! Rows come back depth-first over the task trees: a parent always precedes
//! its children when both are present, with roots and siblings in insertion
//! order, so callers can render indentation straight from `depth`. Filters
//! are applied after ordering, which preserves the parent-before-child
//! property among whatever remains.

use std::collections::HashMap;

use super::registry::JobRegistry;
use super::types::{JobId, JobKind, JobStatus, JobSummary};

/// Optional status/kind restriction for a listing call.
#[derive(Clone, Copy, Debug, Default, serde::Deserialize)]
pub struct ListFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
}

impl ListFilter {
    fn admits(&self, summary: &JobSummary) -> bool {
        self.status.is_none_or(|s| summary.status == s)
            && self.kind.is_none_or(|k| summary.kind == k)
    }
}

/// List known jobs, live and recently terminal (subject to retention).
pub fn list_jobs(registry: &JobRegistry, filter: &ListFilter) -> Vec<JobSummary> {
    let jobs = registry.snapshot_all();

    // Index children by parent, keeping the registry's insertion order.
    // A job whose parent has been pruned orders as a root.
    let mut roots: Vec<&JobId> = Vec::new();
    let mut children: HashMap<&JobId, Vec<&JobId>> = HashMap::new();
    let known: std::collections::HashSet<&JobId> = jobs.iter().map(|j| &j.id).collect();
    for job in &jobs {
        match job.parent_id.as_ref().filter(|pid| known.contains(pid)) {
            Some(pid) => children.entry(pid).or_default().push(&job.id),
            None => roots.push(&job.id),
        }
    }

    let by_id: HashMap<&JobId, &_> = jobs.iter().map(|j| (&j.id, j)).collect();
    let mut ordered = Vec::with_capacity(jobs.len());
    let mut stack: Vec<&JobId> = roots.into_iter().rev().collect();
    while let Some(id) = stack.pop() {
        if let Some(job) = by_id.get(id) {
            ordered.push(JobSummary::from(*job));
        }
        if let Some(kids) = children.get(id) {
            stack.extend(kids.iter().rev().copied());
        }
    }

    ordered.retain(|summary| filter.admits(summary));
    ordered
}
