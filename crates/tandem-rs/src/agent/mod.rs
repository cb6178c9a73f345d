//! Conversation runtime: the [`Conversation`] loop and its supporting pieces.
//!
//! - [`conversation::Conversation`]: budgets each ask, sends it through a
//!   [`Transport`](crate::api::Transport), runs `TOOL_CALL:` requests and
//!   loops until the model answers without one. Start here.
//! - [`config::ConversationConfig`]: model, system prompt, iteration cap,
//!   history window, streaming and sampling overrides.
//! - [`events`]: [`EventHandler`] trait and [`ConversationEvent`] enum for
//!   observing the loop. Includes [`LoggingHandler`], [`CompositeEventHandler`]
//!   and [`FnEventHandler`].
//! - [`history`]: saving and loading turns as JSON files.

pub mod config;
pub mod conversation;
pub mod events;
pub mod history;

pub use config::ConversationConfig;
pub use conversation::{AskOutcome, Conversation, ConversationState};
pub use events::{
    CompositeEventHandler, ConversationEvent, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler,
};
pub use history::{HistoryError, load_history, save_history};
