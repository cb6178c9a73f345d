//! Context budget planning: decides how much project context and how many
//! relevant files fit next to the system prompt and history, and makes the
//! final message set fit the model's window.
//!
//! Planning happens in two steps:
//!
//! 1. [`BudgetPlanner::plan`] looks at the system prompt, history and new
//!    user text and returns a [`ContextBudget`]: the token and character
//!    allowances for project context and relevant files, and how many history
//!    turns to keep.
//! 2. [`BudgetPlanner::finalize`] assembles the [`PromptParts`] into
//!    messages and, if they still overflow, strips optional content in a
//!    fixed order: project context, relevant files, then the oldest history.
//!    Tool rounds push follow-up turns onto the returned parts and finalize
//!    again before each further request.
//!
//! Allowances never push the total past `capacity - reserve`. Small windows
//! are handled conservatively: at 4096 tokens or less, project context is
//! never included automatically.

use crate::capability::ModelCapabilities;
use crate::context::tokens::{estimate_message_tokens, estimate_tokens, tokens_to_chars};
use crate::{Message, MessageRole};
use serde::Serialize;
use tracing::{debug, warn};

/// Tokens kept free for the model's reply.
pub const DEFAULT_RESPONSE_RESERVE_TOKENS: usize = 500;

/// History using more than this share of the window blocks project context.
pub const DEFAULT_HIGH_WATER_RATIO: f64 = 0.40;

/// Assembled prompts above this share of the window produce a warning.
pub const DEFAULT_WARNING_RATIO: f64 = 0.90;

/// Hard cap on relevant-file characters for the smallest windows.
pub const MINIMAL_TIER_RELEVANT_FILES_CAP_CHARS: usize = 500;

/// Heading placed before the project summary in the system prompt.
pub const PROJECT_CONTEXT_HEADER: &str = "## Project context";

/// Heading placed before relevant file excerpts in the user turn.
pub const RELEVANT_FILES_HEADER: &str = "## Relevant files";

// ── Tiers ──────────────────────────────────────────────────────────

/// Context-window size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextTier {
    /// 4096 tokens or less.
    Minimal,
    /// Up to 6000 tokens.
    Small,
    /// Up to 10000 tokens.
    Medium,
    Large,
}

impl ContextTier {
    pub fn for_capacity(max_context_tokens: usize) -> Self {
        match max_context_tokens {
            0..=4096 => ContextTier::Minimal,
            4097..=5999 => ContextTier::Small,
            6000..=9999 => ContextTier::Medium,
            _ => ContextTier::Large,
        }
    }

    /// Share of the window offered to the project summary.
    pub fn project_ratio(self) -> f64 {
        match self {
            ContextTier::Minimal => 0.0,
            ContextTier::Small => 0.15,
            ContextTier::Medium => 0.20,
            ContextTier::Large => 0.30,
        }
    }

    /// Share of the window offered to query-relevant file excerpts.
    pub fn relevant_files_ratio(self) -> f64 {
        match self {
            ContextTier::Minimal | ContextTier::Small => 0.10,
            ContextTier::Medium => 0.12,
            ContextTier::Large => 0.15,
        }
    }
}

/// Why project context was or was not granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectGate {
    Allowed,
    /// Window of 4096 tokens or less.
    DeniedSmallWindow,
    /// Small windows only take project context at the start of a conversation.
    DeniedHistoryPresent,
    /// History alone is above the high-water mark.
    DeniedHistoryPressure,
    /// Nothing left after the reserve and consumed tokens.
    DeniedNoRoom,
}

// ── Policy ─────────────────────────────────────────────────────────

/// Tunable knobs of the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPolicy {
    /// Tokens reserved for the reply. Default: `500`. Minimal-tier windows
    /// reserve a quarter of the window when that is larger.
    pub response_reserve_tokens: usize,
    /// Default: `0.40`.
    pub high_water_ratio: f64,
    /// Default: `0.90`.
    pub warning_ratio: f64,
    /// Most recent history messages considered at all. Default: `10`.
    pub history_window: usize,
    /// Messages kept under history pressure in the small tier. Default: `5`.
    pub small_tier_turns: usize,
    /// Messages kept under history pressure in the minimal tier. Default: `3`.
    pub minimal_tier_turns: usize,
    /// Default: `500`.
    pub minimal_tier_relevant_files_cap_chars: usize,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            response_reserve_tokens: DEFAULT_RESPONSE_RESERVE_TOKENS,
            high_water_ratio: DEFAULT_HIGH_WATER_RATIO,
            warning_ratio: DEFAULT_WARNING_RATIO,
            history_window: 10,
            small_tier_turns: 5,
            minimal_tier_turns: 3,
            minimal_tier_relevant_files_cap_chars: MINIMAL_TIER_RELEVANT_FILES_CAP_CHARS,
        }
    }
}

impl BudgetPolicy {
    pub fn with_history_window(mut self, messages: usize) -> Self {
        self.history_window = messages;
        self
    }

    pub fn with_response_reserve(mut self, tokens: usize) -> Self {
        self.response_reserve_tokens = tokens;
        self
    }

    fn reserve_for(&self, capacity: usize, tier: ContextTier) -> usize {
        match tier {
            ContextTier::Minimal => self.response_reserve_tokens.max(capacity / 4),
            _ => self.response_reserve_tokens,
        }
    }

    fn turns_under_pressure(&self, tier: ContextTier) -> usize {
        match tier {
            ContextTier::Minimal => self.minimal_tier_turns,
            ContextTier::Small => self.small_tier_turns,
            ContextTier::Medium | ContextTier::Large => self.history_window,
        }
    }
}

// ── Budget report ──────────────────────────────────────────────────

/// Per-request allowances. Derived fresh for every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBudget {
    pub tier: ContextTier,
    pub total_capacity_tokens: usize,
    pub reserved_for_response_tokens: usize,
    /// System prompt, kept history and the new user text.
    pub consumed_by_system_and_history_tokens: usize,
    pub available_for_project_tokens: usize,
    pub available_for_relevant_files_tokens: usize,
    /// Character budget for the project summary.
    pub project_chars: usize,
    /// Character budget for relevant file excerpts.
    pub relevant_files_chars: usize,
    /// Number of most recent history messages to send.
    pub history_turns_to_keep: usize,
    /// Set when even with no optional content the request does not fit.
    pub history_must_be_trimmed: bool,
    pub project_gate: ProjectGate,
}

impl ContextBudget {
    pub fn project_allowed(&self) -> bool {
        self.project_gate == ProjectGate::Allowed && self.project_chars > 0
    }

    /// Tokens committed by this plan, reserve included.
    pub fn committed_tokens(&self) -> usize {
        self.consumed_by_system_and_history_tokens
            + self.available_for_project_tokens
            + self.available_for_relevant_files_tokens
            + self.reserved_for_response_tokens
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "budget: {} consumed + {} project + {} files + {} reserved of {} ({:?}, project {:?})",
            self.consumed_by_system_and_history_tokens,
            self.available_for_project_tokens,
            self.available_for_relevant_files_tokens,
            self.reserved_for_response_tokens,
            self.total_capacity_tokens,
            self.tier,
            self.project_gate,
        )
    }
}

// ── Prompt assembly ────────────────────────────────────────────────

/// The pieces of one request, kept apart so optional content can be
/// stripped before the message list is final.
#[derive(Debug, Clone, Default)]
pub struct PromptParts {
    pub system_prompt: String,
    /// Project summary appended to the system prompt.
    pub project_context: Option<String>,
    pub history: Vec<Message>,
    pub user_text: String,
    /// File excerpts appended to the user turn.
    pub relevant_files: Option<String>,
    /// Assistant replies and tool results that came after the user turn.
    /// Never stripped.
    pub follow_ups: Vec<Message>,
}

impl PromptParts {
    pub fn new(system_prompt: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_text: user_text.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_project_context(mut self, context: Option<String>) -> Self {
        self.project_context = context.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_relevant_files(mut self, files: Option<String>) -> Self {
        self.relevant_files = files.filter(|f| !f.trim().is_empty());
        self
    }

    /// System prompt including the project-context suffix.
    pub fn system_text(&self) -> String {
        match &self.project_context {
            Some(ctx) => format!("{}\n\n{PROJECT_CONTEXT_HEADER}\n{ctx}", self.system_prompt),
            None => self.system_prompt.clone(),
        }
    }

    /// User turn including the relevant-files appendix.
    pub fn user_content(&self) -> String {
        match &self.relevant_files {
            Some(files) => format!("{}\n\n{RELEVANT_FILES_HEADER}\n{files}", self.user_text),
            None => self.user_text.clone(),
        }
    }

    /// Assemble the message list: system turn first, then history in order,
    /// then the user turn and its follow-ups. Stored system turns in the
    /// history are skipped; the system prompt is the only system turn sent.
    pub fn render(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + self.follow_ups.len() + 2);
        let system = self.system_text();
        if !system.trim().is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend(
            self.history
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .cloned(),
        );
        messages.push(Message::user(self.user_content()));
        messages.extend(self.follow_ups.iter().cloned());
        messages
    }

    /// The same request without project context or relevant files.
    pub fn without_optional(&self) -> PromptParts {
        PromptParts {
            project_context: None,
            relevant_files: None,
            ..self.clone()
        }
    }
}

/// Something the final fit check had to do or could not do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetWarning {
    NearCapacity { estimated_tokens: usize, capacity: usize },
    ProjectContextStripped { estimated_tokens: usize },
    RelevantFilesStripped { estimated_tokens: usize },
    HistoryDropped { count: usize },
    Exceeded { estimated_tokens: usize, capacity: usize },
}

impl std::fmt::Display for BudgetWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetWarning::NearCapacity {
                estimated_tokens,
                capacity,
            } => write!(f, "prompt uses ~{estimated_tokens} of {capacity} context tokens"),
            BudgetWarning::ProjectContextStripped { estimated_tokens } => {
                write!(f, "project context removed to fit (now ~{estimated_tokens} tokens)")
            }
            BudgetWarning::RelevantFilesStripped { estimated_tokens } => {
                write!(f, "relevant files removed to fit (now ~{estimated_tokens} tokens)")
            }
            BudgetWarning::HistoryDropped { count } => {
                write!(f, "{count} oldest history turn(s) dropped to fit")
            }
            BudgetWarning::Exceeded {
                estimated_tokens,
                capacity,
            } => write!(
                f,
                "prompt still exceeds the context window (~{estimated_tokens} > {capacity} tokens); sending anyway"
            ),
        }
    }
}

/// A message set ready for formatting and sending.
#[derive(Debug, Clone)]
pub struct FinalizedPrompt {
    pub messages: Vec<Message>,
    pub estimated_tokens: usize,
    pub warnings: Vec<BudgetWarning>,
    /// History messages that survived the fit check.
    pub history_kept: usize,
    /// What is left of the input after stripping. Push follow-ups onto it
    /// and finalize again for the next request.
    pub parts: PromptParts,
}

// ── Planner ────────────────────────────────────────────────────────

/// Budget planner. Stateless apart from its policy.
///
/// ```ignore
/// let planner = BudgetPlanner::default();
/// let budget = planner.plan(&caps, &system_prompt, &history, prompt);
/// let summary = project.summary(budget.project_chars);
/// let parts = PromptParts::new(system_prompt, prompt)
///     .with_history(tail(&history, budget.history_turns_to_keep))
///     .with_project_context(Some(summary));
/// let prompt = planner.finalize(&caps, parts);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BudgetPlanner {
    policy: BudgetPolicy,
}

impl BudgetPlanner {
    pub fn new(policy: BudgetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Work out the allowances for one request.
    pub fn plan(
        &self,
        caps: &ModelCapabilities,
        system_prompt: &str,
        history: &[Message],
        new_user_text: &str,
    ) -> ContextBudget {
        let category = caps.category();
        let capacity = caps.max_context_tokens();
        let tier = ContextTier::for_capacity(capacity);
        let reserved = self.policy.reserve_for(capacity, tier);
        let fixed = estimate_tokens(system_prompt, category) + estimate_tokens(new_user_text, category);

        let windowed = recent(history, self.policy.history_window);
        let history_tokens = estimate_message_tokens(windowed, category);
        let pressure = history_tokens as f64 > capacity as f64 * self.policy.high_water_ratio;
        let keep = if pressure {
            self.policy
                .turns_under_pressure(tier)
                .min(self.policy.history_window)
        } else {
            self.policy.history_window
        }
        .min(history.len());
        let kept_tokens = estimate_message_tokens(recent(history, keep), category);

        let consumed = fixed + kept_tokens;
        let history_must_be_trimmed = consumed + reserved > capacity;
        let room = capacity.saturating_sub(reserved).saturating_sub(consumed);

        let project_gate = if tier == ContextTier::Minimal {
            ProjectGate::DeniedSmallWindow
        } else if pressure {
            ProjectGate::DeniedHistoryPressure
        } else if tier == ContextTier::Small && !history.is_empty() {
            ProjectGate::DeniedHistoryPresent
        } else if room == 0 {
            ProjectGate::DeniedNoRoom
        } else {
            ProjectGate::Allowed
        };

        let project_tokens = if project_gate == ProjectGate::Allowed {
            ratio_of(capacity, tier.project_ratio()).min(room)
        } else {
            0
        };

        let mut files_tokens = ratio_of(capacity, tier.relevant_files_ratio());
        let mut files_chars_cap = usize::MAX;
        if tier == ContextTier::Minimal {
            files_chars_cap = self.policy.minimal_tier_relevant_files_cap_chars;
            files_tokens = files_tokens.min(files_chars_cap / tokens_to_chars(1));
        }
        let files_tokens = files_tokens.min(room - project_tokens);

        let budget = ContextBudget {
            tier,
            total_capacity_tokens: capacity,
            reserved_for_response_tokens: reserved,
            consumed_by_system_and_history_tokens: consumed,
            available_for_project_tokens: project_tokens,
            available_for_relevant_files_tokens: files_tokens,
            project_chars: tokens_to_chars(project_tokens),
            relevant_files_chars: tokens_to_chars(files_tokens).min(files_chars_cap),
            history_turns_to_keep: keep,
            history_must_be_trimmed,
            project_gate,
        };

        if pressure {
            debug!(
                "History uses {history_tokens} of {capacity} tokens; keeping last {keep} turns"
            );
        }
        if history_must_be_trimmed {
            warn!(
                "Request does not fit even without optional context ({consumed} + {reserved} reserved > {capacity})"
            );
        }
        debug!("{}", budget.to_log_string());
        budget
    }

    /// Assemble `parts` into the final message list, stripping optional
    /// content until it fits the window.
    pub fn finalize(&self, caps: &ModelCapabilities, mut parts: PromptParts) -> FinalizedPrompt {
        let capacity = caps.max_context_tokens();
        let category = caps.category();
        let estimate = |parts: &PromptParts| estimate_message_tokens(&parts.render(), category);

        let mut warnings = Vec::new();
        let mut tokens = estimate(&parts);

        if tokens as f64 > capacity as f64 * self.policy.warning_ratio {
            warnings.push(BudgetWarning::NearCapacity {
                estimated_tokens: tokens,
                capacity,
            });
        }

        if tokens > capacity && parts.project_context.take().is_some() {
            tokens = estimate(&parts);
            warnings.push(BudgetWarning::ProjectContextStripped {
                estimated_tokens: tokens,
            });
        }

        if tokens > capacity && parts.relevant_files.take().is_some() {
            tokens = estimate(&parts);
            warnings.push(BudgetWarning::RelevantFilesStripped {
                estimated_tokens: tokens,
            });
        }

        let mut dropped = 0;
        while tokens > capacity && !parts.history.is_empty() {
            parts.history.remove(0);
            dropped += 1;
            tokens = estimate(&parts);
        }
        if dropped > 0 {
            warnings.push(BudgetWarning::HistoryDropped { count: dropped });
        }

        if tokens > capacity {
            warnings.push(BudgetWarning::Exceeded {
                estimated_tokens: tokens,
                capacity,
            });
        }

        for warning in &warnings {
            warn!("Context budget: {warning}");
        }

        FinalizedPrompt {
            history_kept: parts.history.len(),
            messages: parts.render(),
            estimated_tokens: tokens,
            warnings,
            parts,
        }
    }
}

/// The last `n` messages of `history`.
pub fn recent(history: &[Message], n: usize) -> &[Message] {
    &history[history.len().saturating_sub(n)..]
}

fn ratio_of(capacity: usize, ratio: f64) -> usize {
    (capacity as f64 * ratio).floor() as usize
}
