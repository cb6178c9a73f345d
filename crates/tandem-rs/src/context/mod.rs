//! Context window management: token estimates, budgets, compaction and
//! project files.
//!
//! Self-hosted models often have small windows, so every prompt is
//! assembled under an explicit budget:
//!
//! 1. **[`tokens`]** estimates token counts from character counts using the
//!    model category's density.
//!
//! 2. **[`budget`]** splits the window between the system prompt, history,
//!    a project summary and relevant file excerpts, and strips optional
//!    content when the assembled prompt still overflows.
//!
//! 3. **[`compactor`]** shrinks any text to a character allowance, keeping
//!    its head and tail.
//!
//! 4. **[`project`]** describes the working directory and finds files that
//!    mention the user's query, reading them through the LRU
//!    [`file_cache`].

pub mod budget;
pub mod compactor;
pub mod file_cache;
pub mod project;
pub mod tokens;

pub use budget::{
    BudgetPlanner, BudgetPolicy, BudgetWarning, ContextBudget, ContextTier, FinalizedPrompt,
    ProjectGate, PromptParts,
};
pub use compactor::{compact, hard_truncate};
pub use file_cache::FileCache;
pub use project::{ProjectContext, ProjectError, ProjectSnippet};
pub use tokens::{estimate_message_tokens, estimate_tokens, tokens_to_chars};
