//! Convenience re-exports for common `tandem-rs` types.
//!
//! ```ignore
//! use tandem_rs::prelude::*;
//! ```
//!
//! Covers what a typical chat front end needs: capability estimation,
//! transports, the [`Conversation`] loop with its config and event handlers,
//! tools, and project context. Decoders, table internals and budget policy
//! details stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, json_schema_for};

// ── Capabilities ────────────────────────────────────────────────────
pub use crate::capability::{
    CapabilityEstimator, GenerationOverrides, ModelCapabilities, ModelCategory, ProbeConfig,
};

// ── Transports ──────────────────────────────────────────────────────
pub use crate::api::{
    ChatRequest, OllamaTransport, OpenAiTransport, Provider, Transport, TransportError,
};

// ── Conversation runtime ────────────────────────────────────────────
pub use crate::agent::{
    AskOutcome, CompositeEventHandler, Conversation, ConversationConfig, ConversationEvent,
    EventHandler, FnEventHandler, LoggingHandler, NoopHandler, load_history, save_history,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{BudgetPlanner, BudgetWarning, ContextBudget, ProjectContext};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{FnTool, Tool, ToolDef, ToolFuture, ToolResult, ToolSet};
