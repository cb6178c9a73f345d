//! Native Ollama chat transport.

use super::streaming::{parse_ndjson_line, read_stream};
use super::{ChatRequest, Provider, Transport, TransportError, TransportFuture, USER_AGENT, status_error};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Sends requests to `POST {base}/api/chat`.
#[derive(Debug, Clone)]
pub struct OllamaTransport {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: String,
}

impl OllamaTransport {
    /// Create a transport with a whole-request timeout.
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// JSON body for `/api/chat`. Sampling parameters go in `options`.
    pub fn request_body(request: &ChatRequest) -> Value {
        json!({
            "model": request.model,
            "messages": request.wire_messages(),
            "stream": request.stream,
            "options": {
                "temperature": request.params.temperature,
                "top_p": request.params.top_p,
                "top_k": request.params.top_k,
                "num_predict": request.params.max_tokens,
            },
        })
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, TransportError> {
        let body = Self::request_body(request);
        debug!(
            "Ollama request: model={}, messages={}, num_predict={}, stream={}",
            request.model,
            request.messages.len(),
            request.params.max_tokens,
            request.stream,
        );
        trace!("Request payload size: {} bytes", body.to_string().len());

        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = if request.stream {
            read_stream(response, parse_ndjson_line, on_chunk).await?
        } else {
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            if let Some(error) = parsed.error {
                return Err(TransportError::Decode(error));
            }
            let text = parsed
                .message
                .map(|m| m.content)
                .ok_or_else(|| TransportError::Decode("response has no message".into()))?;
            on_chunk(&text);
            text
        };

        debug!(
            "Ollama response in {:.1}s ({} chars)",
            start.elapsed().as_secs_f64(),
            text.chars().count()
        );
        if text.trim().is_empty() {
            return Err(TransportError::Empty);
        }
        Ok(text)
    }
}

impl Transport for OllamaTransport {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn send<'a>(
        &'a self,
        request: &'a ChatRequest,
        on_chunk: &'a mut (dyn FnMut(&str) + Send),
    ) -> TransportFuture<'a> {
        Box::pin(self.chat(request, on_chunk))
    }
}
