//! Tools the model can invoke through the `TOOL_CALL:` text protocol.
//!
//! # Submodules
//!
//! - [`core`]: the [`Tool`] trait, the [`ToolSet`] registry, [`FnTool`]
//!   for closure-based tools, and [`ToolResult`].
//! - [`common`]: built-in `read_file`, `write_file`, `list_files`,
//!   `execute_command` and `web_search`. Register all at once with
//!   [`ToolSet::with_common_tools()`].
//! - [`calls`]: recognizing `TOOL_CALL:` lines in model output, describing
//!   tools in the system prompt, and feeding results back.

pub mod calls;
pub mod common;
pub mod core;

pub use calls::{ToolInvocation, format_tool_results, parse_tool_calls, tool_prompt};
pub use core::{
    CommonToolsConfig, DEFAULT_MAX_RESULT_BYTES, FnTool, Tool, ToolDef, ToolFuture, ToolResult,
    ToolSet, truncate_result, validate_tool_arguments,
};
