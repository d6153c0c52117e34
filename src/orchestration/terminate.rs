//! Batch job termination with cascading task cancellation.
//!
//! Accepts a batch of job IDs and returns one result per ID; a `not_found`
//! or `invalid_scope` item never prevents termination of the others. For
//! task jobs the whole descendant tree is cancelled and the full affected
//! set reported; for process jobs the kill signal is delivered to the
//! process group.
//!
//! Acknowledgment contract: a result of `terminated` means cancellation was
//! *delivered*, not that the OS process has fully exited. The job's own
//! status transitions to `killed` only once its monitor reaps the real
//! exit, so readers of the registry always see actual outcomes.

use super::registry::JobRegistry;
use super::types::{JobId, TerminationResult};

/// Terminate a batch of jobs on behalf of `caller_scope`.
///
/// Each requested ID is resolved independently:
/// - unknown ID -> `not_found`
/// - owned by another scope -> `invalid_scope`
/// - task -> the task and every live descendant are cancelled; the result
///   lists the complete affected set from one consistent registry snapshot
/// - process -> the kill signal is delivered to its process group
/// - already terminal -> idempotent `terminated` listing only the job itself
pub fn terminate_jobs(
    registry: &JobRegistry,
    ids: &[JobId],
    caller_scope: &str,
) -> Vec<TerminationResult> {
    ids.iter()
        .map(|id| registry.cascade_terminate(id, caller_scope))
        .collect()
}
