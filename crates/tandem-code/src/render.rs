//! Terminal rendering of [`ConversationEvent`]s.
//!
//! Reply text goes to stdout as it streams; tool activity, budget warnings
//! and failures go to stderr so piping the answer stays clean.

use std::io::{self, Write};
use std::sync::Mutex;

use tandem_rs::agent::{ConversationEvent, EventHandler};
use tandem_rs::context::BudgetWarning;

type Sink = Mutex<Box<dyn Write + Send>>;

/// Longest tool payload echoed to the terminal.
const TOOL_PREVIEW_CHARS: usize = 200;

/// Prints conversation events to the terminal.
pub struct TerminalHandler {
    out: Sink,
    err: Sink,
}

impl TerminalHandler {
    pub fn new() -> Self {
        Self::with_writers(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn with_writers(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }

    fn write_out(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn write_err(&self, line: &str) {
        let mut err = self.err.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(err, "{line}");
    }
}

impl Default for TerminalHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let mut shown: String = first_line.chars().take(TOOL_PREVIEW_CHARS).collect();
    if shown.len() < text.len() {
        shown.push_str("...");
    }
    shown
}

impl EventHandler for TerminalHandler {
    fn on_event(&self, event: &ConversationEvent<'_>) {
        match event {
            ConversationEvent::TextDelta(delta) => self.write_out(delta),
            ConversationEvent::ResponseComplete { .. } => self.write_out("\n"),
            ConversationEvent::BudgetWarning(warning) => match warning {
                BudgetWarning::NearCapacity { .. } | BudgetWarning::Exceeded { .. } => {
                    self.write_err(&format!("[warning] {warning}"));
                }
                _ => self.write_err(&format!("[context] {warning}")),
            },
            ConversationEvent::ToolExecuting(call) => {
                self.write_err(&format!("[tool] {} {}", call.tool, call.params_value()));
            }
            ConversationEvent::ToolCompleted(result) => {
                let status = if result.success { "ok" } else { "error" };
                self.write_err(&format!(
                    "[tool] {} {status}: {}",
                    result.tool,
                    preview(&result.payload)
                ));
            }
            ConversationEvent::TransportFailed(err) => {
                self.write_err(&format!("[error] {err}"));
            }
            ConversationEvent::IterationLimitReached { max_iterations } => {
                self.write_err(&format!(
                    "[warning] stopped after {max_iterations} iterations with tool calls pending"
                ));
            }
            ConversationEvent::BudgetPlanned(_)
            | ConversationEvent::StateChanged { .. }
            | ConversationEvent::Finished => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tandem_rs::tools::ToolResult;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn handler() -> (TerminalHandler, Buffer, Buffer) {
        let out = Buffer::default();
        let err = Buffer::default();
        let handler = TerminalHandler::with_writers(Box::new(out.clone()), Box::new(err.clone()));
        (handler, out, err)
    }

    #[test]
    fn reply_goes_to_stdout_and_tools_to_stderr() {
        let (handler, out, err) = handler();
        handler.on_event(&ConversationEvent::TextDelta("Hel"));
        handler.on_event(&ConversationEvent::TextDelta("lo"));
        handler.on_event(&ConversationEvent::ResponseComplete {
            iteration: 1,
            text: "Hello",
        });
        handler.on_event(&ConversationEvent::ToolCompleted(&ToolResult::error(
            "read_file",
            "file not found",
        )));

        assert_eq!(out.text(), "Hello\n");
        assert_eq!(err.text(), "[tool] read_file error: file not found\n");
    }

    #[test]
    fn warnings_are_labelled() {
        let (handler, out, err) = handler();
        let warning = BudgetWarning::HistoryDropped { count: 2 };
        handler.on_event(&ConversationEvent::BudgetWarning(&warning));
        handler.on_event(&ConversationEvent::IterationLimitReached { max_iterations: 5 });

        assert!(out.text().is_empty());
        let err = err.text();
        assert!(err.starts_with("[context] 2 oldest history turn(s) dropped to fit\n"));
        assert!(err.contains("[warning] stopped after 5 iterations"));
    }

    #[test]
    fn long_payloads_are_previewed() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).chars().count(), TOOL_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("line one\nline two"), "line one...");
    }
}
