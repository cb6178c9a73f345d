//! Inspect what tandem would do with a model before chatting with it.
//!
//! Resolves the model's capabilities (probing the server unless told not
//! to) and plans a context budget for a given system prompt and a synthetic
//! history of a given size.
//!
//! # Examples
//!
//! ```sh
//! # Probe a local Ollama model
//! tandem --provider ollama --model qwen2.5-coder:7b
//!
//! # Offline estimate for an LM Studio model with 3000 tokens of history
//! tandem --provider lmstudio --model phi-3-mini --no-probe --history-tokens 3000
//!
//! # Machine-readable output
//! tandem --provider openai --model mistral-7b-instruct --base-url http://gpu:8000 --json
//! ```

use clap::Parser;
use serde::Serialize;
use tandem_rs::api::Provider;
use tandem_rs::capability::{CapabilityEstimator, ModelCapabilities, ProbeConfig};
use tandem_rs::context::{BudgetPlanner, ContextBudget};
use tandem_rs::{Message, MessageRole};
use tracing_subscriber::EnvFilter;

/// Tokens per synthetic history turn.
const SYNTHETIC_TURN_TOKENS: usize = 200;

/// Show the capabilities and context budget tandem derives for a model.
#[derive(Parser)]
#[command(name = "tandem")]
struct Cli {
    /// Model server kind: ollama, lmstudio or openai
    #[arg(long)]
    provider: Provider,

    /// Model name as the server knows it
    #[arg(long)]
    model: String,

    /// Server URL (defaults to the provider's local port)
    #[arg(long)]
    base_url: Option<String>,

    /// Skip the live probe; use the knowledge table and name heuristics
    #[arg(long)]
    no_probe: bool,

    /// System prompt to plan around
    #[arg(long, default_value = "You are a helpful assistant.")]
    system_prompt: String,

    /// Size of a synthetic conversation history, in estimated tokens
    #[arg(long, default_value_t = 0)]
    history_tokens: usize,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    provider: Provider,
    model: &'a str,
    capabilities: &'a ModelCapabilities,
    budget: &'a ContextBudget,
}

/// Alternating user/assistant turns adding up to about `tokens`.
fn synthetic_history(tokens: usize, caps: &ModelCapabilities) -> Vec<Message> {
    let chars_for = |t: usize| (t as f64 / caps.tokens_per_char()).ceil() as usize;
    let mut history = Vec::new();
    let mut remaining = tokens;
    while remaining > 0 {
        let turn = remaining.min(SYNTHETIC_TURN_TOKENS);
        let role = if history.len() % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        history.push(Message::new(role, "x".repeat(chars_for(turn))));
        remaining -= turn;
    }
    history
}

fn print_text(report: &Report<'_>) {
    let caps = report.capabilities;
    let budget = report.budget;
    println!("Model:        {} ({})", report.model, report.provider);
    println!("Capabilities: {}", caps.to_log_string());
    println!("  system role: {}", caps.supports_system_role());
    println!(
        "  defaults:    temperature {}, top_p {}, top_k {}",
        caps.default_temperature(),
        caps.default_top_p(),
        caps.default_top_k()
    );
    println!("Budget:       {:?} tier, {} tokens", budget.tier, budget.total_capacity_tokens);
    println!("  reserved for reply:   {}", budget.reserved_for_response_tokens);
    println!("  system + history:     {}", budget.consumed_by_system_and_history_tokens);
    println!(
        "  project context:      {} tokens ({} chars, {:?})",
        budget.available_for_project_tokens, budget.project_chars, budget.project_gate
    );
    println!(
        "  relevant files:       {} tokens ({} chars)",
        budget.available_for_relevant_files_tokens, budget.relevant_files_chars
    );
    println!("  history turns kept:   {}", budget.history_turns_to_keep);
    if budget.history_must_be_trimmed {
        println!("  history must be trimmed to fit");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let estimator = CapabilityEstimator::new();

    let caps = if cli.no_probe {
        estimator.estimate_offline(cli.provider, &cli.model)
    } else {
        let probe = match &cli.base_url {
            Some(url) => ProbeConfig::new(cli.provider, url.clone()),
            None => ProbeConfig::for_provider(cli.provider),
        };
        estimator.estimate(cli.provider, &cli.model, Some(&probe)).await
    };

    let history = synthetic_history(cli.history_tokens, &caps);
    let budget = BudgetPlanner::default().plan(&caps, &cli.system_prompt, &history, "");

    let report = Report {
        provider: cli.provider,
        model: &cli.model,
        capabilities: &caps,
        budget: &budget,
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    } else {
        print_text(&report);
    }
}
