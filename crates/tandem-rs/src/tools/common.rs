//! Built-in tools for a local coding assistant.
//!
//! | Tool | Name | Purpose |
//! |------|------|---------|
//! | [`ReadFile`] | `read_file` | Read a single file |
//! | [`WriteFile`] | `write_file` | Create or overwrite a file |
//! | [`ListFiles`] | `list_files` | List a directory |
//! | [`ExecuteCommand`] | `execute_command` | Run a shell command |
//! | [`WebSearch`] | `web_search` | Placeholder until a search backend is configured |
//!
//! Paths are relative to the tool's `workdir`. Absolute paths and `..`
//! components are refused.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

use crate::json_schema_for;
use crate::tools::core::{Tool, ToolDef, ToolFuture};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

/// Default wall-clock limit for `execute_command`.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

// ── Typed argument structs ──────────────────────────────────────────

/// Typed arguments for `read_file`.
#[derive(Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// File path relative to the project root (e.g. 'src/main.rs').
    pub file_path: String,
}

/// Typed arguments for `write_file`.
#[derive(Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// File path relative to the project root.
    pub file_path: String,
    /// Full new content of the file.
    pub content: String,
}

/// Typed arguments for `list_files`.
#[derive(Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    /// Directory relative to the project root (default '.').
    #[serde(default = "default_directory")]
    pub directory: String,
}

fn default_directory() -> String {
    ".".to_string()
}

/// Typed arguments for `execute_command`.
#[derive(Deserialize, JsonSchema)]
pub struct ExecuteCommandArgs {
    /// Shell command to run in the project root (e.g. 'cargo test').
    pub command: String,
}

/// Typed arguments for `web_search`.
#[derive(Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// The search query.
    pub query: String,
}

fn parse_args<T: serde::de::DeserializeOwned>(params: &Value) -> Result<T, String> {
    serde_json::from_value(params.clone()).map_err(|e| format!("invalid parameters: {e}"))
}

/// Join a model-supplied relative path onto `workdir`.
pub fn resolve_in_workdir(workdir: &str, relative: &str) -> Result<PathBuf, String> {
    let path = Path::new(relative);
    if path.is_absolute() {
        return Err(format!("absolute paths are not allowed: {relative}"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("path traversal not allowed".to_string());
    }
    Ok(Path::new(workdir).join(path))
}

// ── ReadFile ────────────────────────────────────────────────────────

pub struct ReadFile {
    workdir: String,
}

impl ReadFile {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for ReadFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "read_file",
            "Read the content of a file",
            json_schema_for::<ReadFileArgs>(),
        )
    }

    fn execute(&self, params: &Value) -> ToolFuture<'_> {
        Box::pin(read_file(self.workdir.clone(), params.clone()))
    }
}

async fn read_file(workdir: String, params: Value) -> Result<Value, String> {
    let args: ReadFileArgs = parse_args(&params)?;
    let full_path = resolve_in_workdir(&workdir, &args.file_path)?;

    let meta = fs::metadata(&full_path)
        .await
        .map_err(|e| format!("file not found: {} ({e})", args.file_path))?;
    if meta.is_dir() {
        return Err(format!(
            "'{}' is a directory, not a file. Use list_files to browse directories.",
            args.file_path
        ));
    }

    let content = fs::read_to_string(&full_path)
        .await
        .map_err(|e| format!("failed to read '{}': {e}", args.file_path))?;
    Ok(json!({
        "file_path": args.file_path,
        "size": content.chars().count(),
        "content": content,
    }))
}

// ── WriteFile ───────────────────────────────────────────────────────

pub struct WriteFile {
    workdir: String,
}

impl WriteFile {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for WriteFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "write_file",
            "Write content to a file, creating parent directories as needed",
            json_schema_for::<WriteFileArgs>(),
        )
    }

    fn execute(&self, params: &Value) -> ToolFuture<'_> {
        Box::pin(write_file(self.workdir.clone(), params.clone()))
    }
}

async fn write_file(workdir: String, params: Value) -> Result<Value, String> {
    let args: WriteFileArgs = parse_args(&params)?;
    let full_path = resolve_in_workdir(&workdir, &args.file_path)?;
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("failed to create directories: {e}"))?;
    }
    fs::write(&full_path, args.content.as_bytes())
        .await
        .map_err(|e| format!("failed to write '{}': {e}", args.file_path))?;
    Ok(json!({
        "file_path": args.file_path,
        "bytes_written": args.content.len(),
    }))
}

// ── ListFiles ───────────────────────────────────────────────────────

pub struct ListFiles {
    workdir: String,
}

impl ListFiles {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for ListFiles {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "list_files",
            "List files and subdirectories of a directory",
            json_schema_for::<ListFilesArgs>(),
        )
    }

    fn execute(&self, params: &Value) -> ToolFuture<'_> {
        Box::pin(list_files(self.workdir.clone(), params.clone()))
    }
}

async fn list_files(workdir: String, params: Value) -> Result<Value, String> {
    let args: ListFilesArgs = parse_args(&params)?;
    let full_path = resolve_in_workdir(&workdir, &args.directory)?;

    let mut entries = fs::read_dir(&full_path)
        .await
        .map_err(|e| format!("cannot read directory '{}': {e}", args.directory))?;
    let mut files = Vec::new();
    let mut directories = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| format!("cannot read directory '{}': {e}", args.directory))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if meta.is_dir() {
            directories.push(name);
        } else {
            files.push((name, meta.len()));
        }
    }
    files.sort();
    directories.sort();

    Ok(json!({
        "directory": args.directory,
        "total_files": files.len(),
        "total_dirs": directories.len(),
        "files": files
            .iter()
            .map(|(name, size)| json!({"name": name, "size": size}))
            .collect::<Vec<_>>(),
        "directories": directories,
    }))
}

// ── ExecuteCommand ──────────────────────────────────────────────────

/// Run `sh -c <command>` in the working directory with a wall-clock limit.
pub struct ExecuteCommand {
    workdir: String,
    timeout: Duration,
}

impl ExecuteCommand {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Tool for ExecuteCommand {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "execute_command",
            "Run a shell command in the project root and return stdout, stderr and the exit code",
            json_schema_for::<ExecuteCommandArgs>(),
        )
    }

    fn execute(&self, params: &Value) -> ToolFuture<'_> {
        let args: Result<ExecuteCommandArgs, String> = parse_args(params);
        let workdir = self.workdir.clone();
        let limit = self.timeout;
        Box::pin(async move {
            match args {
                Ok(args) => run_shell(&workdir, &args.command, limit).await,
                Err(e) => Err(e),
            }
        })
    }
}

/// Execute `command` via `sh -c` in `workdir`, killing it after `limit`.
pub async fn run_shell(workdir: &str, command: &str, limit: Duration) -> Result<Value, String> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(limit, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("failed to run command: {e}")),
        Err(_) => {
            return Err(format!(
                "command exceeded the {} second timeout",
                limit.as_secs()
            ));
        }
    };

    Ok(json!({
        "command": command,
        "stdout": String::from_utf8_lossy(&output.stdout),
        "stderr": String::from_utf8_lossy(&output.stderr),
        "returncode": output.status.code(),
    }))
}

// ── WebSearch ──────────────────────────────────────────────────────

/// Stand-in for a search backend. Tells the model how to fetch pages
/// instead.
pub struct WebSearch;

impl Tool for WebSearch {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "web_search",
            "Search the web for information",
            json_schema_for::<WebSearchArgs>(),
        )
    }

    fn execute(&self, params: &Value) -> ToolFuture<'_> {
        let result = parse_args::<WebSearchArgs>(params).map(|args| {
            json!({
                "query": args.query,
                "note": "Web search is not configured. Use execute_command with curl to fetch a page instead.",
            })
        });
        Box::pin(async move { result })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
