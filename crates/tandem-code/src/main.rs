//! Terminal assistant for local models.
//!
//! Reads `tandem.toml` (if present), connects to Ollama, LM Studio or any
//! OpenAI-compatible server, and answers questions about the current
//! project with file and shell tools.
//!
//! # Examples
//!
//! ```sh
//! # Interactive session
//! tandem-code --workdir /path/to/project
//!
//! # One-shot, no tools, no streaming
//! tandem-code --prompt "Summarize README.md" --no-tools --no-stream
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use tandem_code::repl::{HELP, history_preview, info_text};
use tandem_code::{AppConfig, Command, TerminalHandler};
use tandem_rs::agent::{Conversation, load_history, save_history};
use tandem_rs::api::Provider;
use tandem_rs::context::ProjectContext;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Terminal assistant for local models.
#[derive(Parser)]
#[command(name = "tandem-code")]
struct Cli {
    /// Configuration file.
    #[arg(long, default_value = tandem_code::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Model server kind: ollama, lmstudio or openai.
    #[arg(long)]
    provider: Option<Provider>,

    /// Model name as the server knows it.
    #[arg(long)]
    model: Option<String>,

    /// Server URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Project directory for tools and project context.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Ask one question and exit.
    #[arg(long)]
    prompt: Option<String>,

    /// Wait for the whole reply instead of streaming it.
    #[arg(long)]
    no_stream: bool,

    /// Do not offer tools to the model.
    #[arg(long)]
    no_tools: bool,

    /// Debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(provider) = self.provider {
            config.model.provider = provider;
        }
        if let Some(model) = &self.model {
            config.model.name = model.clone();
        }
        if let Some(url) = &self.base_url {
            config.model.base_url = Some(url.clone());
        }
        if let Some(dir) = &self.workdir {
            config.agent.project_root = dir.clone();
        }
        if self.no_stream {
            config.agent.stream = false;
        }
        if self.no_tools {
            config.tools.enabled = false;
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn save(config: &AppConfig, conversation: &Conversation<'_>) {
    if conversation.history().is_empty() {
        return;
    }
    match save_history(&config.agent.history_dir, conversation.history()) {
        Ok(path) => tracing::debug!("History saved to {}", path.display()),
        Err(e) => eprintln!("[warning] could not save history: {e}"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AppConfig::load(&cli.config).unwrap_or_else(|e| fail(e));
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        fail(e);
    }

    let transport = config.build_transport().unwrap_or_else(|e| fail(e));
    let caps = config
        .build_estimator()
        .estimate(config.model.provider, &config.model.name, Some(&config.build_probe()))
        .await;

    let workdir = std::fs::canonicalize(&config.agent.project_root)
        .unwrap_or_else(|_| config.agent.project_root.clone());
    let tools = config.build_tool_set(&workdir);
    let project = if config.agent.load_project_context {
        ProjectContext::new(&workdir)
            .map_err(|e| warn!("Project context disabled: {e}"))
            .ok()
    } else {
        None
    };

    let terminal = TerminalHandler::new();
    let mut conversation = Conversation::new(&*transport, caps, config.build_conversation_config())
        .with_event_handler(&terminal);
    if let Some(tools) = &tools {
        conversation = conversation.with_tools(tools);
    }
    if let Some(project) = &project {
        conversation = conversation.with_project(project);
    }

    if let Some(prompt) = &cli.prompt {
        let outcome = conversation.ask(prompt).await;
        if config.agent.save_history {
            save(&config, &conversation);
        }
        if outcome.failed {
            std::process::exit(1);
        }
        return;
    }

    run_repl(&config, &mut conversation, &workdir).await;
}

async fn run_repl(config: &AppConfig, conversation: &mut Conversation<'_>, workdir: &Path) {
    eprintln!(
        "tandem-code: {} via {} in {}. Type 'help' for commands.",
        config.model.name,
        config.model.provider,
        workdir.display()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let _ = stdout.write_all(b"\n> ").await;
        let _ = stdout.flush().await;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Help => println!("{HELP}"),
            Command::Exit => break,
            Command::Clear => {
                conversation.clear_history();
                println!("Conversation cleared.");
            }
            Command::History => {
                if conversation.history().is_empty() {
                    println!("No messages yet.");
                }
                for line in history_preview(conversation.history()) {
                    println!("{line}");
                }
            }
            Command::Save => match save_history(&config.agent.history_dir, conversation.history()) {
                Ok(path) => println!("Saved to {}", path.display()),
                Err(e) => eprintln!("Error: {e}"),
            },
            Command::Load(file) => match load_history(&file) {
                Ok(history) => {
                    println!("Loaded {} message(s).", history.len());
                    conversation.replace_history(history);
                }
                Err(e) => eprintln!("Error: {e}"),
            },
            Command::Info => println!(
                "{}",
                info_text(&config.model.name, conversation.capabilities(), conversation.last_budget())
            ),
            Command::MissingArgument(usage) => eprintln!("Usage: {usage}"),
            Command::Ask(prompt) => {
                conversation.ask(&prompt).await;
                if config.agent.save_history {
                    save(config, conversation);
                }
            }
        }
    }
}
