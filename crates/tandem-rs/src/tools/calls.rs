//! The `TOOL_CALL:` text protocol.
//!
//! Local models rarely support native function calling, so tools are
//! described in the system prompt and invoked with a line such as
//!
//! ```text
//! TOOL_CALL: read_file {"file_path": "src/main.rs"}
//! ```
//!
//! [`parse_tool_calls`] is a best-effort recognizer: anything that does not
//! parse as a tool name followed by a JSON object is ignored.

use super::core::{ToolResult, ToolSet};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Marker that starts a tool invocation in model output.
pub const TOOL_CALL_MARKER: &str = "TOOL_CALL:";

/// A tool call recognized in assistant text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub params: Map<String, Value>,
}

impl ToolInvocation {
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// Every well-formed invocation in `text`, in encounter order.
pub fn parse_tool_calls(text: &str) -> Vec<ToolInvocation> {
    let mut calls = Vec::new();
    let mut rest = text;

    while let Some(pos) = rest.find(TOOL_CALL_MARKER) {
        let after = rest.get(pos + TOOL_CALL_MARKER.len()..).unwrap_or_default();
        rest = after;

        let body = after.trim_start();
        let name_len = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(body.len());
        if name_len == 0 {
            debug!("TOOL_CALL marker without a tool name");
            continue;
        }
        let (name, payload) = body.split_at(name_len);
        let payload = payload.trim_start();
        if !payload.starts_with('{') {
            debug!("TOOL_CALL {name} has no JSON object");
            continue;
        }

        let mut stream = serde_json::Deserializer::from_str(payload).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(params))) => {
                calls.push(ToolInvocation {
                    tool: name.to_string(),
                    params,
                });
                rest = payload.get(stream.byte_offset()..).unwrap_or_default();
            }
            Some(Ok(_)) | None => debug!("TOOL_CALL {name} payload is not an object"),
            Some(Err(e)) => debug!("TOOL_CALL {name} payload is malformed: {e}"),
        }
    }
    calls
}

/// Tool list and calling convention, appended to the system prompt.
pub fn tool_prompt(tools: &ToolSet) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut lines = vec!["Available tools:".to_string()];
    for def in tools.definitions() {
        lines.push(format!(
            "- {}: {} ({})",
            def.name,
            def.description,
            def.parameter_names().join(", ")
        ));
    }
    lines.push(String::new());
    lines.push("To use a tool, write on its own line:".to_string());
    lines.push(format!("{TOOL_CALL_MARKER} <tool_name> <json_parameters>"));
    let example = if tools.contains("read_file") {
        format!(r#"{TOOL_CALL_MARKER} read_file {{"file_path": "README.md"}}"#)
    } else {
        let first = tools.list().into_iter().next().map(|(n, _)| n).unwrap_or_default();
        format!("{TOOL_CALL_MARKER} {first} {{}}")
    };
    lines.push(format!("Example: {example}"));
    lines.push("Tool results are sent back to you in the next message.".to_string());
    lines.join("\n")
}

/// Follow-up user turn carrying tool results back to the model.
pub fn format_tool_results(results: &[ToolResult]) -> String {
    let rendered: Vec<String> = results.iter().map(ToolResult::render).collect();
    format!(
        "Tool results:\n{}\n\nContinue your answer using these results.",
        rendered.join("\n\n")
    )
}
