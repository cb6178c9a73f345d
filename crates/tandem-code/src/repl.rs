//! Interactive loop commands.

use tandem_rs::Message;
use tandem_rs::capability::ModelCapabilities;
use tandem_rs::context::ContextBudget;

/// Turns shown by `history`.
pub const HISTORY_PREVIEW_TURNS: usize = 10;
/// Characters shown per turn by `history`.
pub const HISTORY_PREVIEW_CHARS: usize = 100;

pub const HELP: &str = "\
Commands:
  help          show this help
  exit, quit, q leave
  clear         forget the conversation so far
  history       show the last turns
  save          write the conversation to the history directory
  load <file>   replace the conversation with a saved one
  info          model capabilities and the last context budget
Anything else is sent to the model.";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Exit,
    Clear,
    History,
    Save,
    Load(String),
    Info,
    /// `load` without a file name.
    MissingArgument(&'static str),
    Ask(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        match (head.to_lowercase().as_str(), rest.is_empty()) {
            ("", _) => Command::Empty,
            ("help", true) => Command::Help,
            ("exit" | "quit" | "q", true) => Command::Exit,
            ("clear", true) => Command::Clear,
            ("history", true) => Command::History,
            ("save", true) => Command::Save,
            ("info", true) => Command::Info,
            ("load", true) => Command::MissingArgument("load <file>"),
            ("load", false) => Command::Load(rest.to_string()),
            _ => Command::Ask(line.to_string()),
        }
    }
}

/// One line per recent turn: `[role] first characters...`.
pub fn history_preview(history: &[Message]) -> Vec<String> {
    let start = history.len().saturating_sub(HISTORY_PREVIEW_TURNS);
    history
        .iter()
        .skip(start)
        .map(|m| {
            let flat = m.content.replace('\n', " ");
            let mut shown: String = flat.chars().take(HISTORY_PREVIEW_CHARS).collect();
            if flat.chars().count() > HISTORY_PREVIEW_CHARS {
                shown.push_str("...");
            }
            format!("[{}] {shown}", m.role)
        })
        .collect()
}

/// Text for the `info` command.
pub fn info_text(model: &str, caps: &ModelCapabilities, budget: Option<&ContextBudget>) -> String {
    let mut lines = vec![
        format!("Model: {model}"),
        format!("Capabilities: {}", caps.to_log_string()),
        format!("System role: {}", caps.supports_system_role()),
    ];
    match budget {
        Some(b) => lines.push(format!("Last {}", b.to_log_string())),
        None => lines.push("No request sent yet.".to_string()),
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_rs::capability::ModelCategory;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("  help "), Command::Help);
        assert_eq!(Command::parse("Q"), Command::Exit);
        assert_eq!(Command::parse("quit"), Command::Exit);
        assert_eq!(Command::parse("load history/h.json"), Command::Load("history/h.json".into()));
        assert_eq!(Command::parse("load"), Command::MissingArgument("load <file>"));
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("info"), Command::Info);
    }

    #[test]
    fn words_with_arguments_are_questions() {
        assert_eq!(
            Command::parse("clear the cache in main.rs"),
            Command::Ask("clear the cache in main.rs".into())
        );
        assert_eq!(Command::parse("why?"), Command::Ask("why?".into()));
    }

    #[test]
    fn history_preview_is_short() {
        let mut history: Vec<Message> = (0..12).map(|i| Message::user(format!("turn {i}"))).collect();
        history.push(Message::assistant("a".repeat(150)));

        let lines = history_preview(&history);
        assert_eq!(lines.len(), HISTORY_PREVIEW_TURNS);
        assert_eq!(lines[0], "[user] turn 3");
        assert_eq!(lines[9].len(), "[assistant] ".len() + HISTORY_PREVIEW_CHARS + 3);
    }

    #[test]
    fn info_before_first_request() {
        let caps = ModelCapabilities::new(4096, ModelCategory::Chat).with_system_role(false);
        let text = info_text("phi3", &caps, None);
        assert!(text.starts_with("Model: phi3\n"));
        assert!(text.contains("System role: false"));
        assert!(text.ends_with("No request sent yet."));
    }
}
