//! Custom tools example: a typed `FnTool` next to the built-in tools, driven
//! through a local Ollama model.
//!
//! Demonstrates:
//! - Typed argument structs with `Deserialize` + `JsonSchema`
//! - Conditional tool registration with `with_if`
//! - Event handling with `CompositeEventHandler`
//!
//! # Usage
//!
//! ```bash
//! cargo run --example custom_tools -- qwen2.5-coder:7b
//! ```

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tandem_rs::prelude::*;

/// Arguments for the `word_count` tool.
#[derive(Deserialize, JsonSchema)]
struct WordCountArgs {
    /// Text to count words in.
    text: String,
}

fn word_count_tool() -> FnTool {
    FnTool::new(
        ToolDef::new(
            "word_count",
            "Count the words in a piece of text",
            json_schema_for::<WordCountArgs>(),
        ),
        |args: WordCountArgs| async move {
            Ok::<_, String>(json!({ "words": args.text.split_whitespace().count() }))
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), TransportError> {
    let model = std::env::args().nth(1).unwrap_or_else(|| "llama3.2".to_string());
    let allow_shell = std::env::var("TANDEM_ALLOW_SHELL").is_ok();

    let transport = OllamaTransport::new(Provider::Ollama.default_base_url(), 300)?;
    let caps = CapabilityEstimator::new()
        .estimate(Provider::Ollama, &model, Some(&ProbeConfig::for_provider(Provider::Ollama)))
        .await;
    println!("{}", caps.to_log_string());

    let tools = ToolSet::new()
        .with(word_count_tool())
        .with(tandem_rs::tools::common::ReadFile::new("."))
        .with_if(allow_shell, tandem_rs::tools::common::ExecuteCommand::new("."));

    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(|event| {
            if let ConversationEvent::ToolCompleted(result) = event {
                println!("\n{}", result.render());
            }
        }));

    let config = ConversationConfig::new(model, "You are a concise assistant.");
    let mut conversation = Conversation::new(&transport, caps, config)
        .with_tools(&tools)
        .with_event_handler(&handler);

    let outcome = conversation
        .ask("How many words are in the first line of README.md?")
        .await;

    println!("\n{}", outcome.response);
    println!(
        "\n--- {} iteration(s) | {} tool call(s) | {} ---",
        outcome.iterations,
        outcome.tool_calls,
        outcome.budget.to_log_string()
    );
    Ok(())
}
