use super::schema::{EngineConfig, PartialConfig};
use std::path::PathBuf;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            workspace: self.workspace.or(fallback.workspace),
            max_task_depth: self.max_task_depth.or(fallback.max_task_depth),
            max_jobs: self.max_jobs.or(fallback.max_jobs),
            retention_secs: self.retention_secs.or(fallback.retention_secs),
            agent_command: self.agent_command.or(fallback.agent_command),
        }
    }

    /// Convert to EngineConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> EngineConfig {
        EngineConfig {
            workspace: self.workspace.unwrap_or_else(|| PathBuf::from("./workspace")),
            max_task_depth: self.max_task_depth.unwrap_or(3),
            max_jobs: self.max_jobs.unwrap_or(64),
            retention_secs: self.retention_secs.unwrap_or(3600),
            agent_command: self.agent_command,
        }
    }
}
