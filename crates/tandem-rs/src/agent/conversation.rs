//! The conversation loop: budget, send, detect tool calls, execute, repeat.
//!
//! One [`Conversation`] owns one history and handles one ask at a time.
//! Each ask walks through the states
//! `Idle → AwaitingResponse → (ToolCallDetected → ToolsExecuted → AwaitingResponse)* → Done`.
//!
//! # Lifetime
//!
//! The conversation borrows its transport, tools, project and event handler.
//! Bind them to named variables first:
//!
//! ```ignore
//! let transport = OllamaTransport::new("http://localhost:11434", 300)?;
//! let tools = ToolSet::new().with_common_tools(".");
//! let mut conversation = Conversation::new(&transport, caps, config)
//!     .with_tools(&tools)
//!     .with_event_handler(&LoggingHandler);
//! let outcome = conversation.ask("What does main.rs do?").await;
//! ```

use super::config::ConversationConfig;
use super::events::{ConversationEvent, EventHandler, NoopHandler};
use crate::Message;
use crate::api::format::format_for_transport;
use crate::api::{ChatRequest, Transport};
use crate::capability::ModelCapabilities;
use crate::context::budget::recent;
use crate::context::project::render_snippets;
use crate::context::{
    BudgetPlanner, BudgetWarning, ContextBudget, ProjectContext, PromptParts, estimate_message_tokens,
};
use crate::tools::{ToolResult, ToolSet, format_tool_results, parse_tool_calls, tool_prompt};
use serde::Serialize;
use tracing::{debug, info};

/// Fixed text around the tool results in a follow-up turn.
const TOOL_FOLLOW_UP_OVERHEAD_CHARS: usize = 80;
/// Result heading plus the truncation notice, per call.
const TOOL_RESULT_OVERHEAD_CHARS: usize = 100;
/// Smallest payload handed back, even when the window is already full.
const MIN_TOOL_PAYLOAD_BYTES: usize = 256;

/// Where a conversation is in its ask cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingResponse,
    ToolCallDetected,
    ToolsExecuted,
    Done,
}

/// What one [`Conversation::ask`] produced.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    /// The last assistant text, or `Error: <message>` when the transport failed.
    pub response: String,
    /// Requests sent.
    pub iterations: u32,
    /// Tool invocations executed across all iterations.
    pub tool_calls: usize,
    /// Budget planned for the first request.
    pub budget: ContextBudget,
    pub warnings: Vec<BudgetWarning>,
    /// The last reply still asked for tools.
    pub hit_iteration_cap: bool,
    /// The transport failed.
    pub failed: bool,
}

/// A single conversation with one model.
pub struct Conversation<'a> {
    transport: &'a dyn Transport,
    caps: ModelCapabilities,
    config: ConversationConfig,
    planner: BudgetPlanner,
    tools: Option<&'a ToolSet>,
    project: Option<&'a ProjectContext>,
    handler: &'a dyn EventHandler,
    history: Vec<Message>,
    state: ConversationState,
    last_budget: Option<ContextBudget>,
}

impl<'a> Conversation<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        caps: ModelCapabilities,
        config: ConversationConfig,
    ) -> Self {
        let planner = BudgetPlanner::new(config.budget_policy.clone());
        Self {
            transport,
            caps,
            config,
            planner,
            tools: None,
            project: None,
            handler: &NoopHandler,
            history: Vec::new(),
            state: ConversationState::Idle,
            last_budget: None,
        }
    }

    /// Enable the `TOOL_CALL:` protocol with these tools.
    pub fn with_tools(mut self, tools: &'a ToolSet) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Attach project context (summary and relevant files).
    pub fn with_project(mut self, project: &'a ProjectContext) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Start from previously saved turns.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn capabilities(&self) -> &ModelCapabilities {
        &self.caps
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn replace_history(&mut self, history: Vec<Message>) {
        self.history = history;
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Budget of the most recent ask.
    pub fn last_budget(&self) -> Option<&ContextBudget> {
        self.last_budget.as_ref()
    }

    /// Answer `prompt`, running tools until the model stops asking for them
    /// or `max_iterations` requests have been sent.
    ///
    /// Never fails: a transport error is recorded as an assistant turn
    /// `Error: <message>` and reported through the outcome.
    pub async fn ask(&mut self, prompt: &str) -> AskOutcome {
        let system_prompt = self.system_prompt();
        let budget = self
            .planner
            .plan(&self.caps, &system_prompt, &self.history, prompt);
        self.emit(ConversationEvent::BudgetPlanned(&budget));

        let (project_context, relevant_files) = self.gather_project(&budget, prompt);
        let parts = PromptParts::new(system_prompt, prompt)
            .with_history(recent(&self.history, budget.history_turns_to_keep).to_vec())
            .with_project_context(project_context)
            .with_relevant_files(relevant_files);
        let finalized = self.planner.finalize(&self.caps, parts);
        let mut warnings = finalized.warnings;
        for warning in &warnings {
            self.emit(ConversationEvent::BudgetWarning(warning));
        }
        debug!(
            "Prompt ready: ~{} tokens, {} history message(s)",
            finalized.estimated_tokens, finalized.history_kept
        );

        self.history.push(Message::user(prompt));
        let mut parts = finalized.parts;
        let mut messages = finalized.messages;
        let params = self.caps.tune(&self.config.generation);
        let max_iterations = self.config.max_iterations.max(1);

        let mut response = String::new();
        let mut iterations = 0;
        let mut tool_calls = 0;
        let mut hit_iteration_cap = false;
        let mut failed = false;

        while iterations < max_iterations {
            iterations += 1;
            self.transition(ConversationState::AwaitingResponse);

            if iterations > 1 {
                let refit = self.planner.finalize(&self.caps, parts);
                for warning in &refit.warnings {
                    self.emit(ConversationEvent::BudgetWarning(warning));
                }
                warnings.extend(refit.warnings);
                parts = refit.parts;
                messages = refit.messages;
            }

            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: format_for_transport(&messages, &self.caps),
                params: params.clone(),
                stream: self.config.stream,
            };
            let handler = self.handler;
            let mut on_chunk = |chunk: &str| handler.on_event(&ConversationEvent::TextDelta(chunk));

            let text = match self.transport.send(&request, &mut on_chunk).await {
                Ok(text) => text,
                Err(e) => {
                    self.emit(ConversationEvent::TransportFailed(&e));
                    response = format!("Error: {e}");
                    self.history.push(Message::assistant(response.clone()));
                    failed = true;
                    break;
                }
            };

            self.emit(ConversationEvent::ResponseComplete {
                iteration: iterations,
                text: &text,
            });
            self.history.push(Message::assistant(text.clone()));
            parts.follow_ups.push(Message::assistant(text.clone()));

            let calls = match self.tools {
                Some(_) => parse_tool_calls(&text),
                None => Vec::new(),
            };
            response = text;
            if calls.is_empty() {
                break;
            }
            if iterations >= max_iterations {
                info!("Stopping after {max_iterations} iteration(s) with tool calls pending");
                self.emit(ConversationEvent::IterationLimitReached { max_iterations });
                hit_iteration_cap = true;
                break;
            }

            self.transition(ConversationState::ToolCallDetected);
            let per_call = self.tool_payload_allowance(&parts, &budget, calls.len());
            let mut results: Vec<ToolResult> = Vec::with_capacity(calls.len());
            for call in &calls {
                self.emit(ConversationEvent::ToolExecuting(call));
                let result = match self.tools {
                    Some(tools) => tools.execute_within(&call.tool, &call.params_value(), per_call).await,
                    None => ToolResult::error(&call.tool, "no tools configured"),
                };
                self.emit(ConversationEvent::ToolCompleted(&result));
                results.push(result);
            }
            tool_calls += results.len();
            self.transition(ConversationState::ToolsExecuted);

            let follow_up = format_tool_results(&results);
            self.history.push(Message::user(follow_up.clone()));
            parts.follow_ups.push(Message::user(follow_up));
        }

        self.transition(ConversationState::Done);
        self.emit(ConversationEvent::Finished);
        self.last_budget = Some(budget.clone());

        AskOutcome {
            response,
            iterations,
            tool_calls,
            budget,
            warnings,
            hit_iteration_cap,
            failed,
        }
    }

    /// Configured system prompt plus the tool description, when tools are set.
    fn system_prompt(&self) -> String {
        match self.tools.map(tool_prompt).filter(|p| !p.is_empty()) {
            Some(tools) if self.config.system_prompt.trim().is_empty() => tools,
            Some(tools) => format!("{}\n\n{tools}", self.config.system_prompt),
            None => self.config.system_prompt.clone(),
        }
    }

    /// Bytes each tool payload may use so the next request still leaves the
    /// reply reserve free. Project context and relevant files do not count.
    fn tool_payload_allowance(&self, parts: &PromptParts, budget: &ContextBudget, calls: usize) -> usize {
        let required = estimate_message_tokens(&parts.without_optional().render(), self.caps.category());
        let room_tokens = self
            .caps
            .max_context_tokens()
            .saturating_sub(budget.reserved_for_response_tokens)
            .saturating_sub(required);
        let room_chars = (room_tokens as f64 / self.caps.tokens_per_char()).floor() as usize;
        let per_call = room_chars
            .saturating_sub(TOOL_FOLLOW_UP_OVERHEAD_CHARS)
            / calls.max(1);
        let per_call = per_call.saturating_sub(TOOL_RESULT_OVERHEAD_CHARS);
        debug!("Tool payload allowance: {per_call} bytes per call ({room_tokens} tokens free)");
        per_call.max(MIN_TOOL_PAYLOAD_BYTES)
    }

    /// Project summary and relevant-file excerpts allowed by `budget`.
    fn gather_project(&self, budget: &ContextBudget, prompt: &str) -> (Option<String>, Option<String>) {
        let Some(project) = self.project.filter(|_| self.config.include_project_context) else {
            return (None, None);
        };

        let summary = budget
            .project_allowed()
            .then(|| project.summary(budget.project_chars));

        let max_files = self.config.max_relevant_files;
        let files = if budget.relevant_files_chars > 0 && max_files > 0 {
            let per_file = budget.relevant_files_chars / max_files;
            let snippets = project.relevant_files(prompt, max_files, per_file);
            debug!("{} relevant file(s) for prompt", snippets.len());
            render_snippets(&snippets, budget.relevant_files_chars)
        } else {
            None
        };

        (summary, files)
    }

    fn transition(&mut self, to: ConversationState) {
        if self.state != to {
            let from = self.state;
            self.state = to;
            self.emit(ConversationEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: ConversationEvent<'_>) {
        self.handler.on_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::FnEventHandler;
    use crate::api::{Provider, TransportError, TransportFuture};
    use crate::capability::ModelCategory;
    use crate::context::BudgetPolicy;
    use crate::context::budget::PROJECT_CONTEXT_HEADER;
    use crate::json_schema_for;
    use crate::tools::{FnTool, ToolDef};
    use crate::MessageRole;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replies with scripted results and records every request.
    struct MockTransport {
        replies: Mutex<VecDeque<Result<String, TransportError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockTransport {
        fn new(replies: Vec<Result<String, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn always(reply: &str, count: usize) -> Self {
            Self::new((0..count).map(|_| Ok(reply.to_string())).collect())
        }

        fn sent(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn provider(&self) -> Provider {
            Provider::Ollama
        }

        fn send<'a>(
            &'a self,
            request: &'a ChatRequest,
            on_chunk: &'a mut (dyn FnMut(&str) + Send),
        ) -> TransportFuture<'a> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(request.clone());
                let reply = self
                    .replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Err(TransportError::Empty));
                if let Ok(text) = &reply {
                    on_chunk(text);
                }
                reply
            })
        }
    }

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        text: String,
    }

    fn echo_tools() -> ToolSet {
        ToolSet::new().with(FnTool::new(
            ToolDef::new("echo", "Return the text", json_schema_for::<EchoArgs>()),
            |args: EchoArgs| async move { Ok::<_, String>(json!({ "echoed": args.text })) },
        ))
    }

    fn caps() -> ModelCapabilities {
        ModelCapabilities::new(8192, ModelCategory::General).with_system_role(true)
    }

    #[tokio::test]
    async fn plain_answer_takes_one_request() {
        let transport = MockTransport::new(vec![Ok("Hello!".into())]);
        let mut conversation =
            Conversation::new(&transport, caps(), ConversationConfig::new("m", "Be kind."));

        let outcome = conversation.ask("hi").await;

        assert_eq!(outcome.response, "Hello!");
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.failed && !outcome.hit_iteration_cap);
        assert_eq!(conversation.state(), ConversationState::Done);
        assert_eq!(conversation.history().len(), 2);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].model, "m");
        assert_eq!(sent[0].messages[0].role, MessageRole::System);
        assert_eq!(sent[0].messages[0].content, "Be kind.");
        assert_eq!(sent[0].messages[1].content, "hi");
    }

    #[tokio::test]
    async fn tool_call_round_trip() {
        let transport = MockTransport::new(vec![
            Ok(r#"Checking. TOOL_CALL: echo {"text": "ping"}"#.into()),
            Ok("The tool said ping.".into()),
        ]);
        let tools = echo_tools();
        let mut conversation =
            Conversation::new(&transport, caps(), ConversationConfig::new("m", "sys"))
                .with_tools(&tools);

        let outcome = conversation.ask("use echo").await;

        assert_eq!(outcome.response, "The tool said ping.");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls, 1);

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].messages[0].content.contains("Available tools:\n- echo"));
        let follow_up = &sent[1].messages.last().unwrap().content;
        assert!(follow_up.starts_with("Tool results:\nResult echo:"));
        assert!(follow_up.contains("\"echoed\": \"ping\""));

        let roles: Vec<MessageRole> = conversation.history().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_folded_back_as_error() {
        let transport = MockTransport::new(vec![
            Ok(r#"TOOL_CALL: nope {"a": 1}"#.into()),
            Ok("ok".into()),
        ]);
        let tools = echo_tools();
        let mut conversation =
            Conversation::new(&transport, caps(), ConversationConfig::new("m", "sys"))
                .with_tools(&tools);

        let outcome = conversation.ask("go").await;
        assert_eq!(outcome.response, "ok");
        let sent = transport.sent();
        let follow_up = &sent[1].messages.last().unwrap().content;
        assert!(follow_up.contains("Error nope: unknown tool 'nope'"));
    }

    #[tokio::test]
    async fn stops_at_iteration_cap() {
        let reply = r#"TOOL_CALL: echo {"text": "again"}"#;
        let transport = MockTransport::always(reply, 10);
        let tools = echo_tools();
        let config = ConversationConfig::new("m", "sys").with_max_iterations(3);
        let mut conversation = Conversation::new(&transport, caps(), config).with_tools(&tools);

        let outcome = conversation.ask("loop").await;

        assert_eq!(transport.sent().len(), 3);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.tool_calls, 2);
        assert!(outcome.hit_iteration_cap);
        assert!(!outcome.failed);
        assert_eq!(outcome.response, reply);
    }

    #[tokio::test]
    async fn tool_calls_ignored_without_tools() {
        let reply = r#"TOOL_CALL: echo {"text": "x"}"#;
        let transport = MockTransport::always(reply, 3);
        let mut conversation =
            Conversation::new(&transport, caps(), ConversationConfig::new("m", "sys"));

        let outcome = conversation.ask("hi").await;
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.response, reply);
    }

    #[tokio::test]
    async fn transport_error_becomes_error_turn() {
        let transport = MockTransport::new(vec![Err(TransportError::Status {
            status: 500,
            body: "boom".into(),
        })]);
        let failures = Arc::new(Mutex::new(0));
        let f = failures.clone();
        let handler = FnEventHandler::new(move |event| {
            if let ConversationEvent::TransportFailed(_) = event {
                *f.lock().unwrap() += 1;
            }
        });
        let mut conversation =
            Conversation::new(&transport, caps(), ConversationConfig::new("m", "sys"))
                .with_event_handler(&handler);

        let outcome = conversation.ask("hi").await;

        assert!(outcome.failed);
        assert_eq!(outcome.response, "Error: server returned HTTP 500: boom");
        assert_eq!(*failures.lock().unwrap(), 1);
        let last = conversation.history().last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert!(last.content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn system_turn_folded_when_unsupported() {
        let transport = MockTransport::new(vec![Ok("fine".into())]);
        let caps = ModelCapabilities::new(8192, ModelCategory::General).with_system_role(false);
        let mut conversation =
            Conversation::new(&transport, caps, ConversationConfig::new("m", "Rules."));

        conversation.ask("hi").await;
        let sent = transport.sent();
        assert_eq!(sent[0].messages[0].role, MessageRole::User);
        assert_eq!(sent[0].messages[0].content, "System: Rules.");
    }

    #[tokio::test]
    async fn history_carries_into_next_ask() {
        let transport = MockTransport::new(vec![Ok("one".into()), Ok("two".into())]);
        let mut conversation =
            Conversation::new(&transport, caps(), ConversationConfig::new("m", "sys"));

        conversation.ask("first").await;
        conversation.ask("second").await;

        let second = &transport.sent()[1];
        let contents: Vec<&str> = second.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "first", "one", "second"]);
        assert_eq!(conversation.history().len(), 4);

        conversation.clear_history();
        assert!(conversation.history().is_empty());
    }

    #[tokio::test]
    async fn events_follow_the_state_machine() {
        let transport = MockTransport::new(vec![
            Ok(r#"TOOL_CALL: echo {"text": "a"}"#.into()),
            Ok("done".into()),
        ]);
        let tools = echo_tools();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        let handler = FnEventHandler::new(move |event| {
            let label = match event {
                ConversationEvent::BudgetPlanned(_) => "budget".to_string(),
                ConversationEvent::StateChanged { to, .. } => format!("{to:?}"),
                ConversationEvent::ToolExecuting(call) => format!("exec {}", call.tool),
                ConversationEvent::Finished => "finished".to_string(),
                _ => return,
            };
            l.lock().unwrap().push(label);
        });
        let mut conversation =
            Conversation::new(&transport, caps(), ConversationConfig::new("m", "sys"))
                .with_tools(&tools)
                .with_event_handler(&handler);

        conversation.ask("go").await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "budget",
                "AwaitingResponse",
                "ToolCallDetected",
                "exec echo",
                "ToolsExecuted",
                "AwaitingResponse",
                "Done",
                "finished"
            ]
        );
    }

    #[tokio::test]
    async fn project_summary_reaches_system_turn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# Widget\nMakes widgets.").unwrap();
        std::fs::write(dir.path().join("widget.rs"), "fn widget() {}").unwrap();
        let project = ProjectContext::new(dir.path()).unwrap();

        let transport = MockTransport::new(vec![Ok("sure".into())]);
        let caps = ModelCapabilities::new(32_768, ModelCategory::General).with_system_role(true);
        let mut conversation =
            Conversation::new(&transport, caps, ConversationConfig::new("m", "sys"))
                .with_project(&project);

        let outcome = conversation.ask("explain the widget code").await;
        assert!(outcome.budget.project_allowed());

        let sent = transport.sent();
        assert!(sent[0].messages[0].content.contains("widget.rs"));
        let user = &sent[0].messages.last().unwrap().content;
        assert!(user.starts_with("explain the widget code"));
        assert!(user.contains("### widget.rs"));
        // Stored history keeps the bare prompt.
        assert_eq!(conversation.history()[0].content, "explain the widget code");
    }

    #[derive(Deserialize, JsonSchema)]
    struct DumpArgs {
        n: usize,
    }

    #[tokio::test]
    async fn large_tool_output_pushes_project_context_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "alpha beta gamma\n".repeat(1000)).unwrap();
        let project = ProjectContext::new(dir.path()).unwrap();

        let tools = ToolSet::new().with_max_result_bytes(100_000).with(FnTool::new(
            ToolDef::new("dump", "Return n characters", json_schema_for::<DumpArgs>()),
            |args: DumpArgs| async move { Ok::<_, String>(json!("z".repeat(args.n))) },
        ));
        let transport = MockTransport::new(vec![
            Ok("TOOL_CALL: dump {\"n\": 20000}".into()),
            Ok("done".into()),
        ]);
        let caps = ModelCapabilities::new(4500, ModelCategory::General).with_system_role(true);
        let config = ConversationConfig::new("m", "sys")
            .with_budget_policy(BudgetPolicy::default().with_response_reserve(100));
        let mut conversation = Conversation::new(&transport, caps.clone(), config)
            .with_tools(&tools)
            .with_project(&project);

        let outcome = conversation.ask("please dump the numbers").await;
        assert_eq!(outcome.response, "done");
        assert!(outcome.budget.project_allowed());
        assert!(
            outcome
                .warnings
                .iter()
                .any(|w| matches!(w, BudgetWarning::ProjectContextStripped { .. })),
            "{:?}",
            outcome.warnings
        );

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].messages[0].content.contains(PROJECT_CONTEXT_HEADER));
        assert!(!sent[1].messages[0].content.contains(PROJECT_CONTEXT_HEADER));

        let tool_turn = &sent[1].messages.last().unwrap().content;
        assert!(tool_turn.contains("[truncated: 20002 bytes total]"));
        assert!(estimate_message_tokens(&sent[1].messages, caps.category()) <= 4500);
    }
}
