use std::path::PathBuf;

use crate::orchestration::types::JobId;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors raised by the job registry when admitting a new job.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job id already registered: {0}")]
    DuplicateId(JobId),

    #[error("max tracked jobs reached ({count}/{limit})")]
    Capacity { count: usize, limit: usize },

    #[error("max task nesting depth exceeded ({depth} > {limit})")]
    DepthExceeded { depth: usize, limit: usize },

    #[error("parent job not found: {0}")]
    ParentNotFound(JobId),

    #[error("parent job is not a task: {0}")]
    ParentNotTask(JobId),

    #[error("parent job is no longer live: {0}")]
    ParentNotLive(JobId),

    #[error("parent job belongs to a different scope: {0}")]
    ParentScopeMismatch(JobId),
}

/// Errors related to spawning background work.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to spawn shell process: {0}")]
    Process(#[source] std::io::Error),
}

/// Errors related to reading captured process output.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("no background process with id: {0}")]
    NotFound(JobId),
}

/// Errors produced by the external agent-invocation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("no agent capability configured for this host")]
    Unavailable,

    #[error("agent command failed to start: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("agent command exited with code {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },
}
