mod cli;
mod config;
mod error;
mod orchestration;
mod tools;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use orchestration::invoker::{AgentInvoker, CommandInvoker, UnavailableInvoker};
use orchestration::registry::JobRegistry;
use tools::{HostRequest, ToolHost, tool_specs};

/// How often the retention sweeper scans for expired terminal jobs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Logs go to stderr; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = cli::Cli::parse();

    match &cli.command {
        cli::Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&tool_specs())?);
            Ok(())
        }
        cli::Commands::Serve { .. } => serve(&cli).await,
    }
}

async fn serve(cli: &cli::Cli) -> anyhow::Result<()> {
    let config = config::load_config(cli)?;
    tokio::fs::create_dir_all(&config.workspace).await?;

    tracing::info!(
        workspace = %config.workspace.display(),
        max_task_depth = config.max_task_depth,
        max_jobs = config.max_jobs,
        retention_secs = config.retention_secs,
        agent = config.agent_command.is_some(),
        "Overseer starting"
    );

    let root_token = CancellationToken::new();
    let registry = JobRegistry::new(root_token, config.max_task_depth, config.max_jobs);
    let _sweeper =
        registry.spawn_retention_sweeper(Duration::from_secs(config.retention_secs), SWEEP_INTERVAL);

    let invoker: Arc<dyn AgentInvoker> = match &config.agent_command {
        Some(command) => Arc::new(CommandInvoker::new(command.clone(), config.workspace.clone())),
        None => {
            tracing::warn!("No agent command configured; task spawns will fail");
            Arc::new(UnavailableInvoker)
        }
    };

    let host = ToolHost::new(registry.clone(), invoker, config);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    println!("{}", handle_line(&host, line).await);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
    }

    registry.shutdown_all().await;
    tracing::info!("Overseer stopped");
    Ok(())
}

async fn handle_line(host: &ToolHost, line: &str) -> String {
    match serde_json::from_str::<HostRequest>(line) {
        Ok(request) => host.dispatch(&request.scope, &request.tool, request.args).await,
        Err(e) => serde_json::json!({"error": format!("malformed request: {e}")}).to_string(),
    }
}
