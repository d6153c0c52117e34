use serde::Deserialize;
use std::path::PathBuf;

/// The TOML file structure for overseer.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub workspace: Option<String>,
    /// Shell command realizing sub-agent invocations (prompt on stdin,
    /// report on stdout). Absent means the host has no agent capability.
    pub agent_command: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    pub max_task_depth: Option<usize>,
    pub max_jobs: Option<usize>,
    /// How long terminal jobs stay listable before the sweeper removes them.
    pub retention_secs: Option<u64>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workspace: PathBuf,
    pub max_task_depth: usize,
    pub max_jobs: usize,
    pub retention_secs: u64,
    pub agent_command: Option<String>,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub workspace: Option<PathBuf>,
    pub max_task_depth: Option<usize>,
    pub max_jobs: Option<usize>,
    pub retention_secs: Option<u64>,
    pub agent_command: Option<String>,
}

impl ConfigFile {
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general.unwrap_or(GeneralConfig {
            workspace: None,
            agent_command: None,
        });
        let limits = self.limits.unwrap_or(LimitsConfig {
            max_task_depth: None,
            max_jobs: None,
            retention_secs: None,
        });
        PartialConfig {
            workspace: general.workspace.map(PathBuf::from),
            max_task_depth: limits.max_task_depth,
            max_jobs: limits.max_jobs,
            retention_secs: limits.retention_secs,
            agent_command: general.agent_command,
        }
    }
}
