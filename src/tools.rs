//! Tool schema definitions and dispatch for the surrounding tool-call layer.
//!
//! Exposes the orchestration operations (`spawn_process`, `spawn_task`,
//! `read_output`, `write_stdin`, `await_jobs`, `list_jobs`,
//! `terminate_jobs`) as JSON tool schemas and routes invocations to the
//! engine.
//!
//! Tool errors are always returned as structured JSON strings (never panics
//! or `Err` variants) so the invoking agent can observe the error and react.
//! Per-item conditions (`not_found`, `invalid_scope`, timeouts) are data in
//! the results; only structural misuse (unknown tool, malformed arguments)
//! produces a call-level `{"error": ...}`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::EngineConfig;
use crate::orchestration::invoker::AgentInvoker;
use crate::orchestration::list::{ListFilter, list_jobs};
use crate::orchestration::output::OutputFilter;
use crate::orchestration::process::{read_output, spawn_process};
use crate::orchestration::registry::JobRegistry;
use crate::orchestration::task::{SpawnedTask, TaskRequest, spawn_task};
use crate::orchestration::terminate::terminate_jobs;
use crate::orchestration::wait::{AwaitSelector, await_jobs};

/// One tool descriptor: name, description, and JSON schema for arguments.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Value,
}

/// One line of the stdio host protocol.
#[derive(Debug, Deserialize)]
pub struct HostRequest {
    pub tool: String,
    /// Owning workspace/session identity, supplied on every call.
    pub scope: String,
    #[serde(default)]
    pub args: Value,
}

/// Define the six orchestration tool schemas.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "spawn_process",
            description: "Spawn a detached background shell command. Returns the job \
                 snapshot immediately; the process runs via `sh -c` in the workspace \
                 directory and its output is captured for later read_output calls.",
            schema: json!({
                "type": "object",
                "properties": {
                    "script": {"type": "string", "description": "Shell command to execute"},
                    "title": {"type": "string", "description": "Optional human label"}
                },
                "required": ["script"]
            }),
        },
        ToolSpec {
            name: "spawn_task",
            description: "Spawn a sub-agent task. With run_in_background=false the call \
                 blocks and returns the sub-agent's report directly; otherwise it \
                 returns a queued job handle. Tasks may nest via parent_id.",
            schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "Instruction text for the sub-agent"},
                    "agent_type": {"type": "string", "description": "Sub-agent classification, e.g. explore or exec"},
                    "title": {"type": "string", "description": "Optional human label"},
                    "run_in_background": {"type": "boolean", "description": "Defaults to true"},
                    "parent_id": {"type": "string", "description": "Spawning task, for recursive sub-agents"}
                },
                "required": ["prompt", "agent_type"]
            }),
        },
        ToolSpec {
            name: "read_output",
            description: "Read new captured output of a background process since the last \
                 read. Each line is delivered at most once. An optional substring or \
                 regex filter restricts what is returned without affecting consumption.",
            schema: json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Process job ID"},
                    "filter": {"type": "string", "description": "Substring filter"},
                    "filter_pattern": {"type": "string", "description": "Regex line filter (takes precedence over filter)"}
                },
                "required": ["id"]
            }),
        },
        ToolSpec {
            name: "write_stdin",
            description: "Write data to a running background process's stdin. The handle \
                 stays open for further writes.",
            schema: json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Process job ID"},
                    "data": {"type": "string", "description": "Bytes to write (append a newline for line-buffered readers)"}
                },
                "required": ["id", "data"]
            }),
        },
        ToolSpec {
            name: "await_jobs",
            description: "Block until the given jobs (or all active jobs when ids is \
                 omitted) reach a terminal status, up to timeout_secs. Jobs still \
                 pending at the deadline are reported with their current status.",
            schema: json!({
                "type": "object",
                "properties": {
                    "ids": {"type": "array", "items": {"type": "string"}},
                    "timeout_secs": {"type": "number", "description": "Defaults to 30"}
                }
            }),
        },
        ToolSpec {
            name: "list_jobs",
            description: "List known jobs, live and recently terminal, in hierarchy-stable \
                 order (a parent always precedes its children). Optional status and \
                 kind filters.",
            schema: json!({
                "type": "object",
                "properties": {
                    "status": {"type": "string", "enum": ["queued", "running", "completed", "error", "exited", "killed", "terminated"]},
                    "kind": {"type": "string", "enum": ["process", "task"]}
                }
            }),
        },
        ToolSpec {
            name: "terminate_jobs",
            description: "Terminate a batch of jobs. Task jobs are cancelled together with \
                 all live descendants; process jobs receive a kill signal. One result \
                 per requested ID; failures never abort the rest of the batch.",
            schema: json!({
                "type": "object",
                "properties": {
                    "ids": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["ids"]
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct SpawnProcessArgs {
    script: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpawnTaskArgs {
    prompt: String,
    agent_type: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default = "default_background")]
    run_in_background: bool,
    #[serde(default)]
    parent_id: Option<String>,
}

fn default_background() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ReadOutputArgs {
    id: String,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    filter_pattern: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteStdinArgs {
    id: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AwaitArgs {
    #[serde(default)]
    ids: Option<Vec<String>>,
    #[serde(default = "default_timeout")]
    timeout_secs: f64,
}

fn default_timeout() -> f64 {
    30.0
}

#[derive(Debug, Deserialize)]
struct TerminateArgs {
    ids: Vec<String>,
}

/// Dispatch entry point owned by the host: one registry, one agent
/// capability, one resolved configuration.
pub struct ToolHost {
    registry: JobRegistry,
    invoker: Arc<dyn AgentInvoker>,
    config: EngineConfig,
}

impl ToolHost {
    pub fn new(registry: JobRegistry, invoker: Arc<dyn AgentInvoker>, config: EngineConfig) -> Self {
        Self {
            registry,
            invoker,
            config,
        }
    }

    /// Route one tool invocation to its implementation.
    ///
    /// Always returns a `String` -- either a JSON success payload or a JSON
    /// error object `{"error": "..."}`. Never panics or returns `Err`.
    pub async fn dispatch(&self, scope: &str, tool: &str, args: Value) -> String {
        match tool {
            "spawn_process" => self.dispatch_spawn_process(scope, args).await,
            "spawn_task" => self.dispatch_spawn_task(scope, args).await,
            "read_output" => self.dispatch_read_output(args),
            "write_stdin" => self.dispatch_write_stdin(args).await,
            "await_jobs" => self.dispatch_await(args).await,
            "list_jobs" => self.dispatch_list(args),
            "terminate_jobs" => self.dispatch_terminate(scope, args),
            unknown => json!({"error": format!("Unknown tool: {unknown}")}).to_string(),
        }
    }

    async fn dispatch_spawn_process(&self, scope: &str, args: Value) -> String {
        let args: SpawnProcessArgs = match parse_args("spawn_process", args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        match spawn_process(
            &self.registry,
            args.script,
            args.title,
            scope.to_string(),
            &self.config,
        )
        .await
        {
            Ok(job) => to_json(&job),
            Err(e) => json!({"error": format!("spawn_process failed: {e}")}).to_string(),
        }
    }

    async fn dispatch_spawn_task(&self, scope: &str, args: Value) -> String {
        let args: SpawnTaskArgs = match parse_args("spawn_task", args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        let request = TaskRequest {
            prompt: args.prompt,
            agent_type: args.agent_type,
            title: args.title,
            run_in_background: args.run_in_background,
            parent_id: args.parent_id,
        };

        match spawn_task(&self.registry, self.invoker.clone(), request, scope.to_string()).await {
            Ok(SpawnedTask::Background(job)) => to_json(&job),
            Ok(SpawnedTask::Finished(result)) => to_json(&result),
            Err(e) => json!({"error": format!("spawn_task failed: {e}")}).to_string(),
        }
    }

    fn dispatch_read_output(&self, args: Value) -> String {
        let args: ReadOutputArgs = match parse_args("read_output", args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        let filter = if let Some(pattern) = args.filter_pattern {
            match OutputFilter::line_pattern(&pattern) {
                Ok(filter) => Some(filter),
                Err(e) => {
                    return json!({"error": format!("read_output: invalid filter pattern: {e}")})
                        .to_string();
                }
            }
        } else {
            args.filter.map(OutputFilter::substring)
        };

        match read_output(&self.registry, &args.id, filter.as_ref()) {
            Ok(read) => to_json(&read),
            Err(e) => json!({"error": format!("read_output: {e}")}).to_string(),
        }
    }

    async fn dispatch_write_stdin(&self, args: Value) -> String {
        let args: WriteStdinArgs = match parse_args("write_stdin", args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        match self.registry.write_stdin(&args.id, args.data.as_bytes()).await {
            Ok(written) => json!({"id": args.id, "written_bytes": written}).to_string(),
            Err(e) => json!({"error": format!("write_stdin: {e}")}).to_string(),
        }
    }

    async fn dispatch_await(&self, args: Value) -> String {
        let args: AwaitArgs = match parse_args("await_jobs", args) {
            Ok(args) => args,
            Err(e) => return e,
        };

        let selector = match args.ids {
            Some(ids) => AwaitSelector::Ids(ids),
            None => AwaitSelector::AllActive,
        };
        let results = await_jobs(&self.registry, selector, args.timeout_secs).await;
        to_json(&results)
    }

    fn dispatch_list(&self, args: Value) -> String {
        let filter: ListFilter = match parse_args("list_jobs", args) {
            Ok(filter) => filter,
            Err(e) => return e,
        };
        to_json(&list_jobs(&self.registry, &filter))
    }

    fn dispatch_terminate(&self, scope: &str, args: Value) -> String {
        let args: TerminateArgs = match parse_args("terminate_jobs", args) {
            Ok(args) => args,
            Err(e) => return e,
        };
        to_json(&terminate_jobs(&self.registry, &args.ids, scope))
    }
}

/// Parse tool arguments, treating absent args as an empty object.
fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> Result<T, String> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| json!({"error": format!("{tool}: invalid arguments: {e}")}).to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        json!({"error": format!("Failed to serialize result: {e}")}).to_string()
    })
}
