//! Provider transports: everything between the
//! [`Conversation`](crate::agent::conversation::Conversation) loop and a
//! model server.
//!
//! - [`ollama`]: native Ollama `/api/chat` with NDJSON streaming.
//! - [`openai`]: OpenAI-style `/v1/chat/completions` with SSE streaming,
//!   used for LM Studio, vLLM, llama.cpp server and similar.
//! - [`streaming`]: line buffering and the two stream decoders.
//! - [`format`]: reshapes a message list for providers without a usable
//!   system role.
//!
//! Transports never retry. A failed request is reported once as a
//! [`TransportError`] and the conversation turns it into an error reply.

pub mod format;
pub mod ollama;
pub mod openai;
pub mod streaming;

pub use format::format_for_transport;
pub use ollama::OllamaTransport;
pub use openai::OpenAiTransport;

use crate::capability::GenerationParams;
use crate::{Message, MessageRole};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// User-Agent sent by both transports.
pub const USER_AGENT: &str = concat!("tandem-rs/", env!("CARGO_PKG_VERSION"));

// ── Provider ───────────────────────────────────────────────────────

/// Kind of model server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "lmstudio", alias = "lm-studio")]
    LmStudio,
    #[serde(rename = "openai", alias = "openai-compatible")]
    OpenAiCompatible,
}

impl Provider {
    /// Where the server listens when installed with default settings.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::LmStudio => "http://localhost:1234",
            Provider::OpenAiCompatible => "http://localhost:8000",
        }
    }

    /// Whether a `system` message is passed through as-is. LM Studio chat
    /// templates have been known to drop it, so it is folded into a user
    /// turn there unless configured otherwise.
    pub fn supports_system_role(self) -> bool {
        !matches!(self, Provider::LmStudio)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::LmStudio => "lmstudio",
            Provider::OpenAiCompatible => "openai",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "lmstudio" | "lm-studio" => Ok(Provider::LmStudio),
            "openai" | "openai-compatible" => Ok(Provider::OpenAiCompatible),
            other => Err(format!(
                "unknown provider '{other}' (expected ollama, lmstudio or openai)"
            )),
        }
    }
}

// ── Requests ───────────────────────────────────────────────────────

/// One chat request, already budgeted and formatted.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub params: GenerationParams,
    pub stream: bool,
}

impl ChatRequest {
    /// Messages in wire shape: role and content only.
    pub fn wire_messages(&self) -> Vec<WireMessage<'_>> {
        self.messages
            .iter()
            .map(|m| WireMessage {
                role: m.role,
                content: &m.content,
            })
            .collect()
    }
}

/// A message as both providers expect it on the wire.
#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub role: MessageRole,
    pub content: &'a str,
}

// ── Errors ─────────────────────────────────────────────────────────

/// Why a chat request produced no reply.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("model returned an empty response")]
    Empty,
}

// ── Transport trait ────────────────────────────────────────────────

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<String, TransportError>> + Send + 'a>>;

/// A provider-specific way of sending a [`ChatRequest`].
///
/// `send` resolves to the complete reply text. When the request streams,
/// `on_chunk` is called with each text fragment as it arrives; otherwise it
/// is called once with the whole reply.
pub trait Transport: Send + Sync {
    fn provider(&self) -> Provider;

    fn send<'a>(
        &'a self,
        request: &'a ChatRequest,
        on_chunk: &'a mut (dyn FnMut(&str) + Send),
    ) -> TransportFuture<'a>;
}

/// Read an error body for a non-success status.
async fn status_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(500).collect();
    TransportError::Status { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_defaults() {
        assert_eq!(Provider::Ollama.default_base_url(), "http://localhost:11434");
        assert!(Provider::Ollama.supports_system_role());
        assert!(!Provider::LmStudio.supports_system_role());
        assert!(Provider::OpenAiCompatible.supports_system_role());
    }

    #[test]
    fn provider_parses_from_config_names() {
        assert_eq!("ollama".parse::<Provider>(), Ok(Provider::Ollama));
        assert_eq!("LM-Studio".parse::<Provider>(), Ok(Provider::LmStudio));
        assert_eq!("openai".parse::<Provider>(), Ok(Provider::OpenAiCompatible));
        assert!("transformers".parse::<Provider>().is_err());

        let p: Provider = serde_json::from_str(r#""lmstudio""#).unwrap();
        assert_eq!(p, Provider::LmStudio);
        assert_eq!(Provider::OpenAiCompatible.to_string(), "openai");
    }

    #[test]
    fn wire_messages_drop_timestamps() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![Message::system("s"), Message::user("u")],
            params: GenerationParams {
                max_tokens: 10,
                temperature: 0.2,
                top_p: 0.95,
                top_k: 40,
            },
            stream: false,
        };
        let json = serde_json::to_value(request.wire_messages()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"role": "system", "content": "s"},
                {"role": "user", "content": "u"},
            ])
        );
    }
}
