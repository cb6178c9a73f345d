//! OpenAI-compatible chat transport (LM Studio, vLLM, llama.cpp server).

use super::streaming::{parse_sse_line, read_stream};
use super::{ChatRequest, Provider, Transport, TransportError, TransportFuture, USER_AGENT, status_error};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Join an OpenAI-style API path onto a base URL, adding `/v1` unless the
/// base already ends with it.
pub(crate) fn openai_endpoint(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/{path}")
    } else {
        format!("{base}/v1/{path}")
    }
}

/// Sends requests to `POST {base}/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    client: reqwest::Client,
    base_url: String,
    provider: Provider,
    api_key: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Debug)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize, Debug)]
struct CompletionMessage {
    content: Option<String>,
}

impl OpenAiTransport {
    /// Create a transport with a whole-request timeout. `provider` selects
    /// provider-specific body fields; pass [`Provider::LmStudio`] for
    /// LM Studio.
    pub fn new(
        provider: Provider,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            provider,
            api_key: None,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn endpoint(&self) -> String {
        openai_endpoint(&self.base_url, "chat/completions")
    }

    /// JSON body for `/v1/chat/completions`. `top_k` is not part of the
    /// OpenAI API and is only sent to LM Studio, which accepts it.
    pub fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.wire_messages(),
            "stream": request.stream,
            "temperature": request.params.temperature,
            "top_p": request.params.top_p,
            "max_tokens": request.params.max_tokens,
        });
        if self.provider == Provider::LmStudio {
            body["top_k"] = json!(request.params.top_k);
        }
        body
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, TransportError> {
        let body = self.request_body(request);
        debug!(
            "{} request: model={}, messages={}, max_tokens={}, temp={}, stream={}",
            self.provider,
            request.model,
            request.messages.len(),
            request.params.max_tokens,
            request.params.temperature,
            request.stream,
        );
        trace!("Request payload size: {} bytes", body.to_string().len());

        let start = Instant::now();
        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = if request.stream {
            read_stream(response, parse_sse_line, on_chunk).await?
        } else {
            let completion: ChatCompletion = response
                .json()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            let text = completion
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message)
                .and_then(|m| m.content)
                .ok_or_else(|| TransportError::Decode("response has no choices".into()))?;
            on_chunk(&text);
            text
        };

        debug!(
            "{} response in {:.1}s ({} chars)",
            self.provider,
            start.elapsed().as_secs_f64(),
            text.chars().count()
        );
        if text.trim().is_empty() {
            return Err(TransportError::Empty);
        }
        Ok(text)
    }
}

impl Transport for OpenAiTransport {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn send<'a>(
        &'a self,
        request: &'a ChatRequest,
        on_chunk: &'a mut (dyn FnMut(&str) + Send),
    ) -> TransportFuture<'a> {
        Box::pin(self.chat(request, on_chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use crate::capability::GenerationParams;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "qwen2.5-coder-7b-instruct".into(),
            messages: vec![Message::user("hi")],
            params: GenerationParams {
                max_tokens: 1024,
                temperature: 0.2,
                top_p: 0.9,
                top_k: 20,
            },
            stream: false,
        }
    }

    #[test]
    fn endpoint_does_not_double_v1() {
        assert_eq!(
            openai_endpoint("http://localhost:1234", "models"),
            "http://localhost:1234/v1/models"
        );
        assert_eq!(
            openai_endpoint("http://localhost:8000/v1/", "chat/completions"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn top_k_only_for_lm_studio() {
        let lm = OpenAiTransport::new(Provider::LmStudio, "http://localhost:1234", 5).unwrap();
        let body = lm.request_body(&request());
        assert_eq!(body["top_k"], 20);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["stream"], false);

        let vllm = OpenAiTransport::new(Provider::OpenAiCompatible, "http://localhost:8000", 5).unwrap();
        assert!(vllm.request_body(&request()).get("top_k").is_none());
        assert_eq!(vllm.provider(), Provider::OpenAiCompatible);
    }

    #[tokio::test]
    async fn unreachable_server_is_an_http_error() {
        let t = OpenAiTransport::new(Provider::OpenAiCompatible, "http://127.0.0.1:9", 1)
            .unwrap()
            .with_api_key(Some("sk-local".into()));
        let mut sink = |_: &str| {};
        let err = t.send(&request(), &mut sink).await.unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }
}
