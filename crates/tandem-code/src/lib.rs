//! Terminal assistant for local models, built on tandem-rs.
//!
//! The library half holds what the binary needs apart from terminal I/O:
//! the `tandem.toml` schema ([`AppConfig`]), the default system prompt, and
//! the terminal event renderer.
//!
//! ```ignore
//! use tandem_code::AppConfig;
//!
//! let config = AppConfig::load("tandem.toml")?;
//! config.validate()?;
//! let transport = config.build_transport()?;
//! let caps = config
//!     .build_estimator()
//!     .estimate(config.model.provider, &config.model.name, Some(&config.build_probe()))
//!     .await;
//! ```
//!
//! # Binary
//!
//! ```sh
//! # Interactive session in the current project
//! tandem-code
//!
//! # One-shot question against LM Studio
//! tandem-code --provider lmstudio --model qwen2.5-coder-7b-instruct --prompt "Explain src/lib.rs"
//! ```

pub mod config;
pub mod prompt;
pub mod render;
pub mod repl;

pub use config::{AppConfig, ConfigError};
pub use prompt::default_system_prompt;
pub use render::TerminalHandler;
pub use repl::Command;
