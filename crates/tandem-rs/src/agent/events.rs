//! Events and handlers for the [`Conversation`](super::conversation::Conversation).
//!
//! A conversation reports what it is doing through [`ConversationEvent`]
//! variants, from budget planning through tool execution to completion.
//! Callers implement [`EventHandler`] to render them in a terminal, log
//! them, or collect them in tests. The library itself never prints.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | Custom `impl EventHandler` | Full control (terminal rendering) |

use crate::agent::conversation::ConversationState;
use crate::api::TransportError;
use crate::context::{BudgetWarning, ContextBudget};
use crate::tools::{ToolInvocation, ToolResult};
use tracing::{debug, info, trace, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by a conversation while answering one prompt.
#[derive(Debug)]
pub enum ConversationEvent<'a> {
    /// The budget for the first request of this ask was planned.
    BudgetPlanned(&'a ContextBudget),
    /// The final fit check had to strip content, or the prompt is close to
    /// (or over) the context window.
    BudgetWarning(&'a BudgetWarning),
    /// The orchestrator moved between states.
    StateChanged {
        from: ConversationState,
        to: ConversationState,
    },
    /// A fragment of the reply as it streams in.
    TextDelta(&'a str),
    /// A complete reply for one iteration.
    ResponseComplete { iteration: u32, text: &'a str },
    /// A tool is about to run.
    ToolExecuting(&'a ToolInvocation),
    /// A tool finished (successfully or not).
    ToolCompleted(&'a ToolResult),
    /// The transport failed; an error turn was recorded instead of a reply.
    TransportFailed(&'a TransportError),
    /// The reply still asked for tools after the last allowed iteration.
    IterationLimitReached { max_iterations: u32 },
    /// The ask is complete.
    Finished,
}

/// Handler for conversation events.
///
/// Events are informational; the default implementation ignores them.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl EventHandler for Printer {
///     fn on_event(&self, event: &ConversationEvent<'_>) {
///         if let ConversationEvent::TextDelta(text) = event {
///             print!("{text}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &ConversationEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let ConversationEvent::ToolCompleted(result) = event {
///         eprintln!("{}", result.render());
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ConversationEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ConversationEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ConversationEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ConversationEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(interactive, TerminalHandler::new());
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &ConversationEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &ConversationEvent<'_>) {
        match event {
            ConversationEvent::BudgetPlanned(budget) => {
                info!("{}", budget.to_log_string());
            }
            ConversationEvent::BudgetWarning(warning) => {
                warn!("Context budget: {warning}");
            }
            ConversationEvent::StateChanged { from, to } => {
                debug!("State {from:?} -> {to:?}");
            }
            ConversationEvent::TextDelta(text) => {
                trace!("delta: {} bytes", text.len());
            }
            ConversationEvent::ResponseComplete { iteration, text } => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "Reply {iteration}: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            ConversationEvent::ToolExecuting(call) => {
                debug!("Executing tool: {}", call.tool);
            }
            ConversationEvent::ToolCompleted(result) => {
                if result.success {
                    debug!("Tool {} result: {} bytes", result.tool, result.payload.len());
                } else {
                    warn!("Tool {} failed: {}", result.tool, result.payload);
                }
            }
            ConversationEvent::TransportFailed(err) => {
                warn!("Transport failed: {err}");
            }
            ConversationEvent::IterationLimitReached { max_iterations } => {
                warn!("Iteration limit ({max_iterations}) reached with tool calls pending");
            }
            ConversationEvent::Finished => {
                info!("Conversation turn finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fn_handler_sees_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let handler = FnEventHandler::new(move |event| {
            if let ConversationEvent::TextDelta(text) = event {
                s.lock().unwrap().push(text.to_string());
            }
        });
        handler.on_event(&ConversationEvent::TextDelta("hel"));
        handler.on_event(&ConversationEvent::Finished);
        handler.on_event(&ConversationEvent::TextDelta("lo"));
        assert_eq!(*seen.lock().unwrap(), vec!["hel", "lo"]);
    }

    #[test]
    fn composite_dispatches_to_all_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        let second = order.clone();
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| first.lock().unwrap().push(1)))
            .with_if(false, NoopHandler)
            .with(FnEventHandler::new(move |_| second.lock().unwrap().push(2)));

        assert_eq!(handler.len(), 2);
        handler.on_event(&ConversationEvent::Finished);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn logging_handler_accepts_every_variant() {
        let result = ToolResult::error("read_file", "missing");
        let err = TransportError::Empty;
        let events = [
            ConversationEvent::StateChanged {
                from: ConversationState::Idle,
                to: ConversationState::AwaitingResponse,
            },
            ConversationEvent::TextDelta("x"),
            ConversationEvent::ResponseComplete {
                iteration: 1,
                text: "done",
            },
            ConversationEvent::ToolCompleted(&result),
            ConversationEvent::TransportFailed(&err),
            ConversationEvent::IterationLimitReached { max_iterations: 5 },
            ConversationEvent::Finished,
        ];
        for event in &events {
            LoggingHandler.on_event(event);
        }
    }
}
