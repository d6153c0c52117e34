use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "overseer", version, about = "Background job orchestration host for AI coding agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the tool dispatch loop over stdin/stdout (one JSON request per
    /// line in, one JSON result per line out)
    Serve {
        /// Workspace directory processes and agent commands run in
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Shell command realizing sub-agent invocations (prompt on stdin,
        /// report on stdout)
        #[arg(long)]
        agent_command: Option<String>,

        /// Maximum task nesting depth (root = 0)
        #[arg(long)]
        max_task_depth: Option<usize>,

        /// Maximum number of tracked jobs
        #[arg(long)]
        max_jobs: Option<usize>,

        /// Path to config file (replaces the global config layer)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the tool schemas as JSON
    Tools,
}
