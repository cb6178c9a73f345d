//! Configuration for a [`Conversation`](super::conversation::Conversation).
//!
//! ```ignore
//! let config = ConversationConfig::new("qwen2.5-coder:7b", "You are a coding assistant.")
//!     .with_max_iterations(8)
//!     .with_streaming(false)
//!     .with_temperature(0.1);
//! ```

use crate::capability::GenerationOverrides;
use crate::context::BudgetPolicy;

/// Default cap on request/tool round-trips per ask.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default number of relevant files injected per ask.
pub const DEFAULT_MAX_RELEVANT_FILES: usize = 3;

/// Settings for one conversation.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub model: String,
    pub system_prompt: String,
    /// Request/tool round-trips per ask. Default: `5`.
    pub max_iterations: u32,
    /// Default: `true`.
    pub stream: bool,
    /// Attach a project summary and relevant files when a project is set
    /// and the budget allows. Default: `true`.
    pub include_project_context: bool,
    /// Default: `3`.
    pub max_relevant_files: usize,
    pub generation: GenerationOverrides,
    /// Planner knobs, including the history window (default 10 messages).
    pub budget_policy: BudgetPolicy,
}

impl ConversationConfig {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stream: true,
            include_project_context: true,
            max_relevant_files: DEFAULT_MAX_RELEVANT_FILES,
            generation: GenerationOverrides::default(),
            budget_policy: BudgetPolicy::default(),
        }
    }

    /// Clamped to at least one iteration.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_history_window(mut self, messages: usize) -> Self {
        self.budget_policy = self.budget_policy.with_history_window(messages);
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_project_context(mut self, include: bool) -> Self {
        self.include_project_context = include;
        self
    }

    pub fn with_max_relevant_files(mut self, max: usize) -> Self {
        self.max_relevant_files = max;
        self
    }

    pub fn with_generation(mut self, generation: GenerationOverrides) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.generation.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.generation.temperature = Some(temperature);
        self
    }

    pub fn with_budget_policy(mut self, policy: BudgetPolicy) -> Self {
        self.budget_policy = policy;
        self
    }

    pub fn history_window(&self) -> usize {
        self.budget_policy.history_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConversationConfig::new("llama3", "Be brief.");
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.history_window(), 10);
        assert!(config.stream);
        assert!(config.include_project_context);
        assert_eq!(config.max_relevant_files, 3);
        assert_eq!(config.generation, GenerationOverrides::default());
    }

    #[test]
    fn builders_override() {
        let config = ConversationConfig::new("llama3", "")
            .with_max_iterations(0)
            .with_history_window(4)
            .with_streaming(false)
            .with_temperature(0.7)
            .with_max_tokens(256);
        assert_eq!(config.max_iterations, 1);
        assert_eq!(config.history_window(), 4);
        assert!(!config.stream);
        assert_eq!(config.generation.temperature, Some(0.7));
        assert_eq!(config.generation.max_tokens, Some(256));
    }
}
