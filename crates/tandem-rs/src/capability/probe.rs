//! Live capability probing against the serving endpoint.
//!
//! Servers expose the context window under many different names. Rather
//! than special-casing each provider, the JSON they return is run through an
//! ordered list of [`FieldRule`]s and the first positive integer wins.

use crate::api::Provider;
use crate::api::openai::openai_endpoint;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default probe timeout. The probe runs once at startup.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// How to reach the model-introspection API.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub provider: Provider,
    pub base_url: String,
    pub timeout: Duration,
    pub api_key: Option<String>,
}

impl ProbeConfig {
    pub fn new(provider: Provider, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            api_key: None,
        }
    }

    /// Probe the provider's default local endpoint.
    pub fn for_provider(provider: Provider) -> Self {
        Self::new(provider, provider.default_base_url())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }
}

// ── Field extraction ───────────────────────────────────────────────

/// One way of finding a context length inside a probe response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// A top-level key: `{"context_length": 8192}`.
    Key(&'static str),
    /// A key inside a nested object: `{"parameters": {"num_ctx": 8192}}`.
    Nested(&'static str, &'static str),
    /// A `key value` line inside a text field:
    /// `{"modelfile": "PARAMETER num_ctx 8192"}`.
    TextParam(&'static str, &'static str),
    /// Any key with the given suffix inside a nested object:
    /// `{"model_info": {"llama.context_length": 131072}}`.
    SuffixKey(&'static str, &'static str),
}

impl FieldRule {
    /// Apply this rule to a probe response.
    pub fn extract(&self, value: &Value) -> Option<usize> {
        match *self {
            FieldRule::Key(key) => value.get(key).and_then(parse_positive),
            FieldRule::Nested(outer, key) => value.get(outer)?.get(key).and_then(parse_positive),
            FieldRule::TextParam(field, key) => scan_text_param(value.get(field)?.as_str()?, key),
            FieldRule::SuffixKey(outer, suffix) => value
                .get(outer)?
                .as_object()?
                .iter()
                .filter(|(k, _)| k.ends_with(suffix))
                .find_map(|(_, v)| parse_positive(v)),
        }
    }
}

/// Rules tried on every probe response, in order.
pub const CONTEXT_LENGTH_RULES: &[FieldRule] = &[
    FieldRule::Key("context_length"),
    FieldRule::Key("max_context_length"),
    FieldRule::Key("max_context"),
    FieldRule::Key("context_size"),
    FieldRule::Key("num_ctx"),
    FieldRule::Nested("parameters", "num_ctx"),
    FieldRule::Nested("parameters", "context_size"),
    FieldRule::TextParam("parameters", "num_ctx"),
    FieldRule::TextParam("parameters", "context_size"),
    FieldRule::TextParam("modelfile", "num_ctx"),
    FieldRule::TextParam("modelfile", "context_size"),
    FieldRule::SuffixKey("model_info", ".context_length"),
];

/// Return the first positive integer any rule extracts.
pub fn extract_context_length(value: &Value, rules: &[FieldRule]) -> Option<usize> {
    rules.iter().find_map(|rule| rule.extract(value))
}

fn parse_positive(value: &Value) -> Option<usize> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    usize::try_from(n).ok().filter(|&n| n > 0)
}

/// Find `key` followed by one or more `:`/whitespace characters and digits,
/// case-insensitively.
fn scan_text_param(text: &str, key: &str) -> Option<usize> {
    let lower = text.to_lowercase();
    let key = key.to_lowercase();
    let mut rest = lower.as_str();
    while let Some(pos) = rest.find(&key) {
        let after = rest.get(pos + key.len()..)?;
        let digits_start = after.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
        let separated = digits_start.len() < after.len();
        let digits: String = digits_start.chars().take_while(char::is_ascii_digit).collect();
        if separated
            && let Ok(n) = digits.parse::<usize>()
            && n > 0
        {
            return Some(n);
        }
        rest = after;
    }
    None
}

// ── Probing ────────────────────────────────────────────────────────

/// Query the endpoint and extract a context length. Any failure yields
/// `None`.
pub async fn probe_context_length(config: &ProbeConfig, model_name: &str) -> Option<usize> {
    let client = match reqwest::Client::builder().timeout(config.timeout).build() {
        Ok(c) => c,
        Err(e) => {
            debug!("Probe client could not be built: {e}");
            return None;
        }
    };

    let response = match config.provider {
        Provider::Ollama => fetch_ollama_show(&client, config, model_name).await,
        Provider::LmStudio | Provider::OpenAiCompatible => {
            fetch_model_listing(&client, config).await
        }
    };

    let body = match response {
        Ok(body) => body,
        Err(e) => {
            debug!("Capability probe for {model_name} failed: {e}");
            return None;
        }
    };

    let context = match config.provider {
        Provider::Ollama => extract_context_length(&body, CONTEXT_LENGTH_RULES),
        Provider::LmStudio | Provider::OpenAiCompatible => select_model_entry(&body, model_name)
            .and_then(|entry| extract_context_length(entry, CONTEXT_LENGTH_RULES)),
    };

    match context {
        Some(n) => debug!("Probe reported {n} context tokens for {model_name}"),
        None => debug!("Probe response for {model_name} exposes no context length"),
    }
    context
}

async fn fetch_ollama_show(
    client: &reqwest::Client,
    config: &ProbeConfig,
    model_name: &str,
) -> Result<Value, reqwest::Error> {
    let url = format!("{}/api/show", config.base_url.trim_end_matches('/'));
    client
        .post(url)
        .json(&serde_json::json!({ "model": model_name, "name": model_name }))
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await
}

async fn fetch_model_listing(
    client: &reqwest::Client,
    config: &ProbeConfig,
) -> Result<Value, reqwest::Error> {
    let mut request = client.get(openai_endpoint(&config.base_url, "models"));
    if let Some(key) = &config.api_key {
        request = request.bearer_auth(key);
    }
    request.send().await?.error_for_status()?.json::<Value>().await
}

/// Pick the listing entry describing `model_name`: an exact id first, then a
/// case-insensitive substring match either way.
pub fn select_model_entry<'a>(listing: &'a Value, model_name: &str) -> Option<&'a Value> {
    let entries = listing.get("data")?.as_array()?;
    let id_of = |entry: &Value| {
        ["id", "model", "name"]
            .iter()
            .find_map(|k| entry.get(*k).and_then(Value::as_str))
            .map(str::to_lowercase)
    };
    let wanted = model_name.to_lowercase();

    entries
        .iter()
        .find(|e| id_of(e).as_deref() == Some(wanted.as_str()))
        .or_else(|| {
            entries.iter().find(|e| {
                id_of(e).is_some_and(|id| id.contains(&wanted) || wanted.contains(&id))
            })
        })
}
