//! Capability inference from the model name alone.
//!
//! Family rules are checked in order and the first hit decides the context
//! window. Parameter-count suffixes (`7b`, `70b`, ...) only apply when no
//! family rule matched.

use super::{CapabilitySource, ModelCapabilities, ModelCategory};

/// Context window assumed when nothing in the name is recognised.
pub const FALLBACK_CONTEXT_TOKENS: usize = 4096;

const CODE_MARKERS: &[&str] = &["coder", "code", "starcoder", "wizardcoder", "phind"];
const CHAT_MARKERS: &[&str] = &["chat", "instruct", "conversational"];

const FAMILY_RULES: &[(&[&str], usize)] = &[
    (&["qwen2.5", "qwen2", "qwen-2"], 32_768),
    (&["qwen"], 8192),
    (&["llama3.1", "llama-3.1", "llama3", "llama-3"], 128_000),
    (&["llama"], 8192),
    (&["mistral", "mixtral"], 32_768),
    (&["deepseek"], 16_384),
    (&["phi"], 4096),
    (&["gemma"], 8192),
    (&["gemini"], 32_768),
    (&["claude"], 200_000),
    (&["gpt-4"], 128_000),
    (&["gpt-3.5", "gpt3"], 16_384),
    (&["gpt"], 4096),
];

const SIZE_RULES: &[(&[&str], usize)] = &[
    (&["7b", "6.7b", "8b"], 16_384),
    (&["13b"], 8192),
    (&["34b", "32b", "30b"], 32_768),
    (&["70b"], 8192),
];

/// Classify a model by the words in its name.
pub fn detect_category(model_name: &str) -> ModelCategory {
    let name = model_name.to_lowercase();
    if CODE_MARKERS.iter().any(|m| name.contains(m)) {
        ModelCategory::Code
    } else if CHAT_MARKERS.iter().any(|m| name.contains(m)) {
        ModelCategory::Chat
    } else {
        ModelCategory::General
    }
}

/// Context window implied by the name.
pub fn infer_context_tokens(model_name: &str) -> usize {
    let name = model_name.to_lowercase();
    first_rule_match(FAMILY_RULES, &name)
        .or_else(|| first_rule_match(SIZE_RULES, &name))
        .unwrap_or(FALLBACK_CONTEXT_TOKENS)
}

/// Full capability estimate from the name.
pub fn infer(model_name: &str) -> ModelCapabilities {
    ModelCapabilities::new(infer_context_tokens(model_name), detect_category(model_name))
        .with_source(CapabilitySource::Heuristic)
}

fn first_rule_match(rules: &[(&[&str], usize)], name: &str) -> Option<usize> {
    rules
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| name.contains(p)))
        .map(|&(_, context)| context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_rules_in_order() {
        assert_eq!(infer_context_tokens("qwen2.5:14b"), 32_768);
        assert_eq!(infer_context_tokens("qwen:4b"), 8192);
        assert_eq!(infer_context_tokens("Llama3.1:8b"), 128_000);
        assert_eq!(infer_context_tokens("llama2:13b"), 8192);
        assert_eq!(infer_context_tokens("claude-like-local"), 200_000);
        assert_eq!(infer_context_tokens("gpt-4o-mini-clone"), 128_000);
        assert_eq!(infer_context_tokens("gpt-3.5-turbo"), 16_384);
        assert_eq!(infer_context_tokens("gpt-j"), 4096);
    }

    #[test]
    fn family_beats_size_suffix() {
        // "phi" resolves to 4096 even though "7b" alone would say 16384.
        assert_eq!(infer_context_tokens("phi:7b"), 4096);
        assert_eq!(infer_context_tokens("gemma:7b"), 8192);
    }

    #[test]
    fn size_suffix_applies_without_family() {
        assert_eq!(infer_context_tokens("solar:7b"), 16_384);
        assert_eq!(infer_context_tokens("vicuna-13b"), 8192);
        assert_eq!(infer_context_tokens("yi-34b"), 32_768);
        assert_eq!(infer_context_tokens("falcon-70b"), 8192);
    }

    #[test]
    fn unknown_names_fall_back() {
        assert_eq!(infer_context_tokens("mystery"), FALLBACK_CONTEXT_TOKENS);
        let caps = infer("mystery");
        assert_eq!(caps.category(), ModelCategory::General);
        assert!((caps.default_temperature() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn coding_names_get_cool_temperature() {
        let caps = infer("wizardcoder-python");
        assert_eq!(caps.category(), ModelCategory::Code);
        assert!((caps.default_temperature() - 0.2).abs() < f32::EPSILON);
        assert_eq!(caps.max_context_tokens(), FALLBACK_CONTEXT_TOKENS);
    }

    #[test]
    fn categories_detected_from_name() {
        assert_eq!(detect_category("codellama:7b"), ModelCategory::Code);
        assert_eq!(detect_category("neural-chat"), ModelCategory::Chat);
        assert_eq!(detect_category("Mistral-7B-Instruct"), ModelCategory::Chat);
        assert_eq!(detect_category("llama3"), ModelCategory::General);
    }

    #[test]
    fn generation_budget_is_half_context_capped() {
        assert_eq!(infer("llama3.1").max_generation_tokens(), 4096);
        assert_eq!(infer("mystery").max_generation_tokens(), 2048);
    }
}
