//! Tool abstraction for text-protocol agents.
//!
//! The [`Tool`] trait defines the interface every tool implements: a static
//! definition (name, description, JSON schema) and an async `execute` method
//! taking already-parsed JSON parameters. Tools are collected into a
//! [`ToolSet`] which handles dispatch, validation, panic isolation and
//! result truncation.

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Maximum size (in bytes) of a rendered tool payload before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 16_000;

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, String>> + Send + 'a>>;

// ── Definitions ────────────────────────────────────────────────────

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameter object.
    pub parameters: Value,
}

impl ToolDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Parameter names in schema order, required ones first.
    pub fn parameter_names(&self) -> Vec<String> {
        let required: Vec<&str> = self
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let mut names: Vec<String> = self
            .parameters
            .get("properties")
            .and_then(Value::as_object)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        names.sort_by_key(|n| !required.contains(&n.as_str()));
        names
    }
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool the model can invoke with a `TOOL_CALL:` line.
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// impl Tool for Echo {
///     fn definition(&self) -> ToolDef {
///         ToolDef::new("echo", "Return the input", json_schema_for::<EchoArgs>())
///     }
///
///     fn execute(&self, params: &Value) -> ToolFuture<'_> {
///         let params = params.clone();
///         Box::pin(async move { Ok(params) })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDef;

    /// Run the tool. Failures are returned as a message for the model, never
    /// as a panic; [`ToolSet::execute`] still catches panics.
    fn execute(&self, params: &Value) -> ToolFuture<'_>;

    fn name(&self) -> String {
        self.definition().name
    }
}

// ── Results ────────────────────────────────────────────────────────

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool: String,
    pub success: bool,
    /// Pretty-printed JSON on success, the error message on failure.
    pub payload: String,
}

impl ToolResult {
    pub fn ok(tool: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            payload: payload.into(),
        }
    }

    pub fn error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            payload: message.into(),
        }
    }

    /// Text fed back to the model.
    pub fn render(&self) -> String {
        if self.success {
            format!("Result {}:\n{}", self.tool, self.payload)
        } else {
            format!("Error {}: {}", self.tool, self.payload)
        }
    }
}

// ── CommonToolsConfig ──────────────────────────────────────────────

/// Per-tool configuration for [`ToolSet::with_common_tools_configured`].
#[derive(Debug, Clone)]
pub struct CommonToolsConfig {
    /// Wall-clock limit for `execute_command`.
    /// Default: [`DEFAULT_COMMAND_TIMEOUT`](crate::tools::common::DEFAULT_COMMAND_TIMEOUT) (30 s).
    pub command_timeout: Duration,
}

impl Default for CommonToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout: crate::tools::common::DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl CommonToolsConfig {
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// Tools dispatched by name, kept in name order.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_common_tools("/path/to/project")
///     .with_if(enable_echo, Echo);
///
/// let result = tools.execute("read_file", &json!({"file_path": "Cargo.toml"})).await;
/// println!("{}", result.render());
/// ```
pub struct ToolSet {
    tools: BTreeMap<String, Box<dyn Tool>>,
    max_result_bytes: usize,
    /// Whether to validate parameters against the tool's JSON Schema.
    validate_args: bool,
    /// Upper bound on any tool's run time. `None` leaves it to the tool.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("max_result_bytes", &self.max_result_bytes)
            .finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: true,
            default_timeout: None,
        }
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// Enable or disable JSON Schema validation of parameters.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register `tool` only when `condition` holds.
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// Register `read_file`, `write_file`, `list_files`, `execute_command`
    /// and `web_search`, all rooted at `workdir`.
    pub fn with_common_tools(self, workdir: impl Into<String>) -> Self {
        self.with_common_tools_configured(workdir, CommonToolsConfig::default())
    }

    pub fn with_common_tools_configured(
        self,
        workdir: impl Into<String>,
        config: CommonToolsConfig,
    ) -> Self {
        use crate::tools::common::{ExecuteCommand, ListFiles, ReadFile, WebSearch, WriteFile};
        let workdir = workdir.into();
        self.with(ReadFile::new(workdir.clone()))
            .with(WriteFile::new(workdir.clone()))
            .with(ListFiles::new(workdir.clone()))
            .with(ExecuteCommand::new(workdir).with_timeout(config.command_timeout))
            .with(WebSearch)
    }

    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// `(name, description)` for every tool, in name order.
    pub fn list(&self) -> Vec<(String, String)> {
        self.tools
            .values()
            .map(|t| {
                let def = t.definition();
                (def.name, def.description)
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a tool by name. Every failure, including unknown names, invalid
    /// parameters and panics, becomes an unsuccessful [`ToolResult`].
    pub async fn execute(&self, name: &str, params: &Value) -> ToolResult {
        self.execute_within(name, params, self.max_result_bytes).await
    }

    /// [`execute`](Self::execute) with the payload cut to at most
    /// `max_bytes` (never more than the set's own limit).
    pub async fn execute_within(&self, name: &str, params: &Value, max_bytes: usize) -> ToolResult {
        let max_payload = max_bytes.min(self.max_result_bytes);
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(name, format!("unknown tool '{name}'"));
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), params)
        {
            debug!("Tool {name} rejected parameters: {error}");
            return ToolResult::error(name, error);
        }

        log_tool_call(name, params);
        let start = Instant::now();

        let guarded = AssertUnwindSafe(tool.execute(params)).catch_unwind();
        let outcome = match self.default_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(r) => r,
                Err(_) => {
                    info!("Tool {name} timed out after {:.0}s", limit.as_secs_f64());
                    return ToolResult::error(
                        name,
                        format!("timed out after {:.0} seconds", limit.as_secs_f64()),
                    );
                }
            },
            None => guarded.await,
        };

        let result = match outcome {
            Ok(Ok(value)) => {
                let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                ToolResult::ok(name, truncate_result(pretty, max_payload))
            }
            Ok(Err(message)) => ToolResult::error(name, truncate_result(message, max_payload)),
            Err(_) => {
                warn!("Tool {name} panicked");
                ToolResult::error(name, "tool panicked during execution")
            }
        };

        debug!(
            "Tool {name} completed in {:.0}ms (success={}, {} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            result.success,
            result.payload.len()
        );
        trace!(
            "Tool {name} result preview: {}",
            result.payload.chars().take(300).collect::<String>()
        );
        result
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler =
    Box<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, String>> + Send>> + Send + Sync>;

/// A closure-based tool that deserializes its parameters into `A`.
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct ShoutArgs { text: String }
///
/// let tool = FnTool::new(
///     ToolDef::new("shout", "Upper-case the text", json_schema_for::<ShoutArgs>()),
///     |args: ShoutArgs| async move { Ok(json!(args.text.to_uppercase())) },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let erased = move |raw: Value| -> Pin<Box<dyn Future<Output = Result<Value, String>> + Send>> {
            match serde_json::from_value::<A>(raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => {
                    let message = format!("invalid parameters: {e}");
                    Box::pin(async move { Err::<Value, String>(message) })
                }
            }
        };
        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, params: &Value) -> ToolFuture<'_> {
        (self.handler)(params.clone())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool").field("name", &self.def.name).finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate parameters against the tool's declared JSON Schema.
///
/// Returns `None` when valid (or when the schema itself cannot be compiled).
pub fn validate_tool_arguments(tool: &dyn Tool, params: &Value) -> Option<String> {
    let schema = tool.definition().parameters;
    let validator = jsonschema::validator_for(&schema).ok()?;

    let errors: Vec<String> = validator
        .iter_errors(params)
        .map(|e| {
            let path = e.instance_path().to_string();
            if path.is_empty() { e.to_string() } else { format!("{path}: {e}") }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!("invalid parameters: {}", errors.join("; ")))
    }
}

/// Log a tool call at INFO level with a truncated preview of parameters.
pub fn log_tool_call(name: &str, params: &Value) {
    let raw = params.to_string();
    let preview: String = raw.chars().take(120).collect();
    info!(
        "[tool] {name}({preview}{})",
        if raw.chars().count() > 120 { "..." } else { "" }
    );
    debug!("[tool] {name} full params ({} bytes)", raw.len());
    trace!("[tool] {name} params: {raw}");
}

/// Truncate to at most `max` bytes on a character boundary, appending a
/// notice if anything was cut.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}...\n[truncated: {} bytes total]",
        s.get(..cut).unwrap_or_default(),
        s.len()
    )
}
