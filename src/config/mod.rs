pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use std::path::Path;

/// Load configuration by merging global, workspace, and CLI sources.
/// Precedence: CLI > workspace config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply); a file
/// that exists but does not parse is an error.
pub fn load_config(cli: &Cli) -> Result<EngineConfig, ConfigError> {
    // Layer 1: Global config (~/.config/overseer/overseer.toml or platform
    // equivalent), unless an explicit --config path replaces it.
    let global = match explicit_config_path(cli) {
        Some(path) => load_toml_file(&path)?.unwrap_or_default(),
        None => load_global_config()?,
    };

    // Determine workspace path from CLI or global config, for loading the
    // workspace-local config.
    let workspace_path = cli_workspace(cli)
        .or_else(|| global.workspace.clone())
        .unwrap_or_else(|| std::path::PathBuf::from("./workspace"));

    // Layer 2: Workspace config (workspace/overseer.toml)
    let workspace = load_toml_file(&workspace_path.join("overseer.toml"))?.unwrap_or_default();

    // Layer 3: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    // Merge: CLI > workspace > global > defaults
    Ok(cli_partial
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize())
}

/// Load global config from the platform-specific config directory.
fn load_global_config() -> Result<PartialConfig, ConfigError> {
    match global_config_path() {
        Some(path) => Ok(load_toml_file(&path)?.unwrap_or_default()),
        None => {
            tracing::debug!("Could not determine global config directory");
            Ok(PartialConfig::default())
        }
    }
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns `Ok(None)` on file-not-found.
fn load_toml_file(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
            Ok(config_file) => {
                tracing::info!("Loaded config from {}", path.display());
                Ok(Some(config_file.to_partial()))
            }
            Err(e) => Err(ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(None)
        }
        Err(e) => Err(ConfigError::IoError(e)),
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/overseer/overseer.toml
/// macOS: ~/Library/Application Support/overseer/overseer.toml
fn global_config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "overseer")
        .map(|dirs| dirs.config_dir().join("overseer.toml"))
}

/// Extract workspace path from CLI args.
fn cli_workspace(cli: &Cli) -> Option<std::path::PathBuf> {
    match &cli.command {
        Commands::Serve { workspace, .. } => workspace.clone(),
        Commands::Tools => None,
    }
}

/// Extract an explicit --config path from CLI args.
fn explicit_config_path(cli: &Cli) -> Option<std::path::PathBuf> {
    match &cli.command {
        Commands::Serve { config, .. } => config.clone(),
        Commands::Tools => None,
    }
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Serve {
            workspace,
            agent_command,
            max_task_depth,
            max_jobs,
            config: _,
        } => PartialConfig {
            workspace: workspace.clone(),
            max_task_depth: *max_task_depth,
            max_jobs: *max_jobs,
            agent_command: agent_command.clone(),
            ..Default::default()
        },
        Commands::Tools => PartialConfig::default(),
    }
}
