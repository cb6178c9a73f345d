//! Model capability estimation.
//!
//! A [`ModelCapabilities`] value describes what a model can take: its context
//! window, how many tokens it may generate, a token-density estimate and the
//! sampling defaults that suit it. [`CapabilityEstimator`] resolves one in
//! three steps, first success wins:
//!
//! 1. **[`probe`]**: ask the serving endpoint (Ollama `/api/show`, or the
//!    OpenAI-style model listing) and extract a context length from whatever
//!    field exposes it.
//! 2. **[`table`]**: look the model name up in a curated table of known
//!    families.
//! 3. **[`heuristics`]**: infer from substrings of the name (`qwen2.5`,
//!    `70b`, `coder`, ...). Unknown names get a conservative 4096 window.
//!
//! Probe failures never reach the caller; they fall through to the next step.

pub mod heuristics;
pub mod probe;
pub mod table;

pub use probe::{FieldRule, ProbeConfig, extract_context_length};
pub use table::{FamilyEntry, KnowledgeTable};

use crate::api::Provider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Largest generation budget ever derived from a context window.
pub const MAX_DERIVED_GENERATION_TOKENS: usize = 4096;

/// Default nucleus-sampling threshold.
pub const DEFAULT_TOP_P: f32 = 0.95;

/// Default top-k sampling cutoff.
pub const DEFAULT_TOP_K: u32 = 40;

/// Broad model family used to pick densities and sampling defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Code,
    Chat,
    General,
}

impl ModelCategory {
    /// Estimated tokens per character of input text.
    pub fn token_density(self) -> f64 {
        match self {
            ModelCategory::Code => 0.30,
            ModelCategory::Chat | ModelCategory::General => 0.25,
        }
    }

    /// Sampling temperature used when nothing else is known.
    pub fn default_temperature(self) -> f32 {
        match self {
            ModelCategory::Code => 0.2,
            ModelCategory::Chat | ModelCategory::General => 0.3,
        }
    }
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelCategory::Code => write!(f, "code"),
            ModelCategory::Chat => write!(f, "chat"),
            ModelCategory::General => write!(f, "general"),
        }
    }
}

/// Which resolution step produced a capability estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilitySource {
    Probe,
    Table,
    Heuristic,
}

/// Limits and defaults for one model. Computed once per session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCapabilities {
    max_context_tokens: usize,
    max_generation_tokens: usize,
    category: ModelCategory,
    tokens_per_char: f64,
    default_temperature: f32,
    default_top_p: f32,
    default_top_k: u32,
    supports_system_role: bool,
    source: CapabilitySource,
}

impl ModelCapabilities {
    /// Capabilities for a context window, deriving the generation budget as
    /// `min(4096, context / 2)`.
    pub fn new(max_context_tokens: usize, category: ModelCategory) -> Self {
        let context = max_context_tokens.max(1);
        Self::with_limits(context, derived_generation_tokens(context), category)
    }

    /// Capabilities with an explicit generation budget. The generation budget
    /// is clamped into `1..=max_context_tokens`.
    pub fn with_limits(
        max_context_tokens: usize,
        max_generation_tokens: usize,
        category: ModelCategory,
    ) -> Self {
        let context = max_context_tokens.max(1);
        Self {
            max_context_tokens: context,
            max_generation_tokens: max_generation_tokens.clamp(1, context),
            category,
            tokens_per_char: category.token_density(),
            default_temperature: category.default_temperature(),
            default_top_p: DEFAULT_TOP_P,
            default_top_k: DEFAULT_TOP_K,
            supports_system_role: true,
            source: CapabilitySource::Heuristic,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    /// Whether the target transport accepts a distinct `system` role.
    pub fn with_system_role(mut self, supported: bool) -> Self {
        self.supports_system_role = supported;
        self
    }

    pub fn with_source(mut self, source: CapabilitySource) -> Self {
        self.source = source;
        self
    }

    pub fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }

    pub fn max_generation_tokens(&self) -> usize {
        self.max_generation_tokens
    }

    pub fn category(&self) -> ModelCategory {
        self.category
    }

    pub fn tokens_per_char(&self) -> f64 {
        self.tokens_per_char
    }

    pub fn default_temperature(&self) -> f32 {
        self.default_temperature
    }

    pub fn default_top_p(&self) -> f32 {
        self.default_top_p
    }

    pub fn default_top_k(&self) -> u32 {
        self.default_top_k
    }

    pub fn supports_system_role(&self) -> bool {
        self.supports_system_role
    }

    pub fn source(&self) -> CapabilitySource {
        self.source
    }

    /// Resolve the sampling parameters for a request.
    ///
    /// `max_tokens` is clamped to the generation budget; unset values come
    /// from the capability defaults. Code models never run hotter than 0.3:
    /// a higher requested temperature is lowered to 0.2.
    pub fn tune(&self, overrides: &GenerationOverrides) -> GenerationParams {
        let limit = u32::try_from(self.max_generation_tokens).unwrap_or(u32::MAX);
        let max_tokens = overrides.max_tokens.map_or(limit, |m| m.min(limit));

        let mut temperature = overrides.temperature.unwrap_or(self.default_temperature);
        if self.category == ModelCategory::Code && temperature > 0.3 {
            debug!("Lowering temperature {temperature} to 0.2 for code model");
            temperature = 0.2;
        }

        GenerationParams {
            max_tokens,
            temperature,
            top_p: overrides.top_p.unwrap_or(self.default_top_p),
            top_k: overrides.top_k.unwrap_or(self.default_top_k),
        }
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "{} model, {} ctx / {} gen tokens (via {:?})",
            self.category, self.max_context_tokens, self.max_generation_tokens, self.source,
        )
    }
}

fn derived_generation_tokens(context: usize) -> usize {
    (context / 2).clamp(1, MAX_DERIVED_GENERATION_TOKENS)
}

// ── Generation parameters ──────────────────────────────────────────

/// User-requested sampling values. Anything left `None` is filled in from
/// [`ModelCapabilities`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerationOverrides {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// Fully resolved sampling parameters sent with each request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

// ── Estimator ──────────────────────────────────────────────────────

/// Resolves [`ModelCapabilities`] through probe, table and heuristics.
///
/// ```ignore
/// let caps = CapabilityEstimator::new()
///     .with_system_role(Some(false))
///     .estimate(Provider::LmStudio, "qwen2.5-coder-7b-instruct", None)
///     .await;
/// assert_eq!(caps.max_context_tokens(), 32_768);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CapabilityEstimator {
    table: KnowledgeTable,
    system_role: Option<bool>,
}

impl CapabilityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the knowledge table (e.g. with user entries prepended).
    pub fn with_table(mut self, table: KnowledgeTable) -> Self {
        self.table = table;
        self
    }

    /// Override the provider's default system-role support. `None` keeps the
    /// provider default.
    pub fn with_system_role(mut self, supported: Option<bool>) -> Self {
        self.system_role = supported;
        self
    }

    /// Resolve capabilities, probing the endpoint first when `probe` is given.
    pub async fn estimate(
        &self,
        provider: Provider,
        model_name: &str,
        probe: Option<&ProbeConfig>,
    ) -> ModelCapabilities {
        let probed = match probe {
            Some(config) => probe::probe_context_length(config, model_name).await,
            None => None,
        };

        let caps = match probed {
            Some(context) => {
                ModelCapabilities::new(context, heuristics::detect_category(model_name))
                    .with_source(CapabilitySource::Probe)
            }
            None => self.resolve_offline(model_name),
        };

        let caps = self.apply_provider(caps, provider);
        info!("Capabilities for {model_name}: {}", caps.to_log_string());
        caps
    }

    /// Resolve capabilities from the table and heuristics only.
    pub fn estimate_offline(&self, provider: Provider, model_name: &str) -> ModelCapabilities {
        let caps = self.resolve_offline(model_name);
        self.apply_provider(caps, provider)
    }

    fn resolve_offline(&self, model_name: &str) -> ModelCapabilities {
        if let Some(entry) = self.table.lookup(model_name) {
            debug!("Table match for {model_name}: {}", entry.family);
            return entry.capabilities();
        }
        debug!("No table match for {model_name}, using name heuristics");
        heuristics::infer(model_name)
    }

    fn apply_provider(&self, caps: ModelCapabilities, provider: Provider) -> ModelCapabilities {
        let supported = self
            .system_role
            .unwrap_or_else(|| provider.supports_system_role());
        caps.with_system_role(supported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_budget_derives_from_context() {
        assert_eq!(ModelCapabilities::new(4096, ModelCategory::General).max_generation_tokens(), 2048);
        assert_eq!(ModelCapabilities::new(32_768, ModelCategory::Code).max_generation_tokens(), 4096);
        assert_eq!(ModelCapabilities::new(1, ModelCategory::Chat).max_generation_tokens(), 1);
    }

    #[test]
    fn zero_context_is_clamped() {
        let caps = ModelCapabilities::new(0, ModelCategory::General);
        assert_eq!(caps.max_context_tokens(), 1);
        assert!(caps.max_generation_tokens() <= caps.max_context_tokens());
    }

    #[test]
    fn explicit_generation_never_exceeds_context() {
        let caps = ModelCapabilities::with_limits(2000, 8000, ModelCategory::General);
        assert_eq!(caps.max_generation_tokens(), 2000);
    }

    #[test]
    fn density_depends_on_category() {
        assert!((ModelCategory::Code.token_density() - 0.30).abs() < f64::EPSILON);
        assert!((ModelCategory::Chat.token_density() - 0.25).abs() < f64::EPSILON);
        let caps = ModelCapabilities::new(8192, ModelCategory::Code);
        assert!((caps.tokens_per_char() - 0.30).abs() < f64::EPSILON);
    }

    #[test]
    fn tune_clamps_max_tokens_and_fills_defaults() {
        let caps = ModelCapabilities::new(8192, ModelCategory::General);
        let params = caps.tune(&GenerationOverrides {
            max_tokens: Some(32_000),
            ..Default::default()
        });
        assert_eq!(params.max_tokens, 4096);
        assert!((params.temperature - 0.3).abs() < f32::EPSILON);
        assert!((params.top_p - 0.95).abs() < f32::EPSILON);
        assert_eq!(params.top_k, 40);
    }

    #[test]
    fn tune_cools_down_code_models() {
        let caps = ModelCapabilities::new(16_384, ModelCategory::Code);
        let params = caps.tune(&GenerationOverrides {
            temperature: Some(0.9),
            ..Default::default()
        });
        assert!((params.temperature - 0.2).abs() < f32::EPSILON);

        let general = ModelCapabilities::new(16_384, ModelCategory::General);
        let params = general.tune(&GenerationOverrides {
            temperature: Some(0.9),
            ..Default::default()
        });
        assert!((params.temperature - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn offline_estimate_prefers_table_over_heuristics() {
        let estimator = CapabilityEstimator::new();
        // Heuristics alone would say 32768 for any mistral.
        let caps = estimator.estimate_offline(Provider::Ollama, "mistral:7b");
        assert_eq!(caps.max_context_tokens(), 8192);
        assert_eq!(caps.source(), CapabilitySource::Table);
    }

    #[test]
    fn unknown_model_gets_conservative_defaults() {
        let caps = CapabilityEstimator::new().estimate_offline(Provider::Ollama, "mystery-model");
        assert_eq!(caps.max_context_tokens(), 4096);
        assert_eq!(caps.category(), ModelCategory::General);
        assert!((caps.default_temperature() - 0.3).abs() < f32::EPSILON);
        assert_eq!(caps.source(), CapabilitySource::Heuristic);
    }

    #[test]
    fn system_role_follows_provider_unless_overridden() {
        let estimator = CapabilityEstimator::new();
        assert!(estimator.estimate_offline(Provider::Ollama, "llama3").supports_system_role());
        assert!(!estimator.estimate_offline(Provider::LmStudio, "llama3").supports_system_role());

        let forced = CapabilityEstimator::new().with_system_role(Some(true));
        assert!(forced.estimate_offline(Provider::LmStudio, "llama3").supports_system_role());
    }

    #[tokio::test]
    async fn unreachable_probe_falls_through() {
        let probe = ProbeConfig::new(Provider::Ollama, "http://127.0.0.1:9")
            .with_timeout(std::time::Duration::from_millis(200));
        let caps = CapabilityEstimator::new()
            .estimate(Provider::Ollama, "deepseek-coder:6.7b", Some(&probe))
            .await;
        assert_eq!(caps.max_context_tokens(), 16_384);
        assert_eq!(caps.category(), ModelCategory::Code);
        assert_eq!(caps.source(), CapabilitySource::Table);
    }
}
