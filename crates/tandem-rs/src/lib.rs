//! Context-budgeting chat core for self-hosted language models.
//!
//! `tandem-rs` talks to a model served by Ollama or any OpenAI-compatible
//! endpoint (LM Studio, vLLM, llama.cpp server) whose size and limits are not
//! known up front. It estimates what the model can take, fits the system
//! prompt, conversation history, a project summary and query-relevant files
//! into that window, and drives a small text-based tool-call loop on top.
//!
//! # Getting started
//!
//! ```ignore
//! use tandem_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TransportError> {
//!     let transport = OllamaTransport::new("http://localhost:11434", 300)?;
//!     let caps = CapabilityEstimator::new()
//!         .estimate(Provider::Ollama, "qwen2.5-coder:7b", Some(&ProbeConfig::for_provider(Provider::Ollama)))
//!         .await;
//!
//!     let tools = ToolSet::new().with_common_tools(".");
//!     let config = ConversationConfig::new("qwen2.5-coder:7b", "You are a coding assistant.");
//!
//!     let mut conversation = Conversation::new(&transport, caps, config)
//!         .with_tools(&tools)
//!         .with_event_handler(&LoggingHandler);
//!
//!     let outcome = conversation.ask("What does src/main.rs do?").await;
//!     println!("{}", outcome.response);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! | Concern | Module |
//! |---------|--------|
//! | Context window, density and sampling defaults for a model | [`capability`] |
//! | Token estimation, budget planning, compaction, project files | [`context`] |
//! | Provider transports, streaming decoders, role folding | [`api`] |
//! | Tool registry, built-in tools, `TOOL_CALL:` parsing | [`tools`] |
//! | Conversation loop, events, history persistence | [`agent`] |

pub mod agent;
pub mod api;
pub mod capability;
pub mod context;
pub mod prelude;
pub mod tools;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Generate a JSON Schema value for a type that derives [`JsonSchema`].
///
/// Used by tools to describe their parameters without hand-writing schema
/// JSON.
///
/// ```
/// use tandem_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ReadArgs {
///     file_path: String,
/// }
///
/// let schema = json_schema_for::<ReadArgs>();
/// assert_eq!(schema["type"], "object");
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a turn in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single conversation turn.
///
/// Turns are stored in the order they happened. A system turn does not have
/// to come first in storage; [`PromptParts`](context::budget::PromptParts)
/// puts it first when the message list is assembled for a transport.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Role and content, ignoring the timestamp.
    pub fn same_turn(&self, other: &Message) -> bool {
        self.role == other.role && self.content == other.content
    }
}
