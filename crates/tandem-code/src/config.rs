//! `tandem.toml` loading, validation and conversion into tandem-rs types.
//!
//! Every section and field is optional; a missing file means defaults.
//!
//! ```toml
//! [model]
//! provider = "lmstudio"
//! name = "qwen2.5-coder-7b-instruct"
//! timeout_secs = 300
//!
//! [generation]
//! temperature = 0.2
//!
//! [agent]
//! max_iterations = 8
//! project_root = "."
//!
//! [tools]
//! command_timeout_secs = 60
//!
//! [[models]]
//! family = "my-finetune"
//! max_context = 16384
//! max_generation = 4096
//! category = "code"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tandem_rs::agent::ConversationConfig;
use tandem_rs::api::{OllamaTransport, OpenAiTransport, Provider, Transport, TransportError};
use tandem_rs::capability::{
    CapabilityEstimator, FamilyEntry, GenerationOverrides, KnowledgeTable, ProbeConfig,
};
use tandem_rs::tools::{CommonToolsConfig, ToolSet};
use tracing::debug;

use crate::prompt::default_system_prompt;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "tandem.toml";

/// Why the configuration could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{field} = {value} is out of range (allowed: {allowed})")]
    Invalid {
        field: &'static str,
        value: String,
        allowed: &'static str,
    },
}

// ── Sections ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Default: `ollama`.
    pub provider: Provider,
    /// Default: `"llama3.2"`.
    pub name: String,
    /// Default: the provider's local port.
    pub base_url: Option<String>,
    /// Chat request timeout. Default: `300`.
    pub timeout_secs: u64,
    /// Default: `10`.
    pub probe_timeout_secs: u64,
    /// Override the provider's system-role support.
    pub system_role: Option<bool>,
    /// Environment variable holding a bearer key for OpenAI-compatible servers.
    pub api_key_env: Option<String>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            name: "llama3.2".to_string(),
            base_url: None,
            timeout_secs: 300,
            probe_timeout_secs: 10,
            system_role: None,
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub system_prompt: String,
    /// Default: `./history`.
    pub history_dir: PathBuf,
    /// Save the conversation after every ask. Default: `true`.
    pub save_history: bool,
    /// Default: `true`.
    pub load_project_context: bool,
    /// Default: `.`.
    pub project_root: PathBuf,
    /// Default: `5`.
    pub max_iterations: u32,
    /// Default: `10`.
    pub history_window: usize,
    /// Default: `true`.
    pub stream: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            history_dir: PathBuf::from("./history"),
            save_history: true,
            load_project_context: true,
            project_root: PathBuf::from("."),
            max_iterations: 5,
            history_window: 10,
            stream: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// Default: `true`.
    pub enabled: bool,
    /// Default: `30`.
    pub command_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            command_timeout_secs: 30,
        }
    }
}

/// The whole `tandem.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelSection,
    pub generation: GenerationOverrides,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    /// Extra knowledge-table rows, consulted before the built-in ones.
    pub models: Vec<FamilyEntry>,
}

// ── Loading and validation ─────────────────────────────────────────

fn check<T>(field: &'static str, value: T, ok: bool, allowed: &'static str) -> Result<(), ConfigError>
where
    T: std::fmt::Display,
{
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            allowed,
        })
    }
}

impl AppConfig {
    /// Read `path`, or return defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.model;
        check("model.name", "\"\"", !m.name.trim().is_empty(), "a non-empty model name")?;
        check("model.timeout_secs", m.timeout_secs, (1..=3600).contains(&m.timeout_secs), "1..=3600")?;
        check(
            "model.probe_timeout_secs",
            m.probe_timeout_secs,
            (1..=300).contains(&m.probe_timeout_secs),
            "1..=300",
        )?;

        let g = &self.generation;
        if let Some(v) = g.max_tokens {
            check("generation.max_tokens", v, (1..=32_768).contains(&v), "1..=32768")?;
        }
        if let Some(v) = g.temperature {
            check("generation.temperature", v, (0.0..=2.0).contains(&v), "0..=2")?;
        }
        if let Some(v) = g.top_p {
            check("generation.top_p", v, (0.0..=1.0).contains(&v), "0..=1")?;
        }
        if let Some(v) = g.top_k {
            check("generation.top_k", v, (1..=100).contains(&v), "1..=100")?;
        }

        let a = &self.agent;
        check("agent.max_iterations", a.max_iterations, (1..=20).contains(&a.max_iterations), "1..=20")?;
        check("agent.history_window", a.history_window, a.history_window >= 1, ">= 1")?;

        let t = &self.tools;
        check(
            "tools.command_timeout_secs",
            t.command_timeout_secs,
            (1..=3600).contains(&t.command_timeout_secs),
            "1..=3600",
        )?;

        for entry in &self.models {
            check("models.max_context", entry.max_context, entry.max_context > 0, "> 0")?;
            check("models.max_generation", entry.max_generation, entry.max_generation > 0, "> 0")?;
        }
        Ok(())
    }

    // ── Builders ───────────────────────────────────────────────────

    pub fn base_url(&self) -> String {
        self.model
            .base_url
            .clone()
            .unwrap_or_else(|| self.model.provider.default_base_url().to_string())
    }

    /// Bearer key from the configured environment variable, if any.
    pub fn api_key(&self) -> Option<String> {
        let var = self.model.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }

    pub fn build_transport(&self) -> Result<Box<dyn Transport>, TransportError> {
        let url = self.base_url();
        let timeout = self.model.timeout_secs;
        let transport: Box<dyn Transport> = match self.model.provider {
            Provider::Ollama => Box::new(OllamaTransport::new(url, timeout)?),
            provider => {
                Box::new(OpenAiTransport::new(provider, url, timeout)?.with_api_key(self.api_key()))
            }
        };
        Ok(transport)
    }

    pub fn build_probe(&self) -> ProbeConfig {
        ProbeConfig::new(self.model.provider, self.base_url())
            .with_timeout(Duration::from_secs(self.model.probe_timeout_secs))
            .with_api_key(self.api_key())
    }

    pub fn build_estimator(&self) -> CapabilityEstimator {
        CapabilityEstimator::new()
            .with_table(KnowledgeTable::builtin().with_entries(self.models.iter().cloned()))
            .with_system_role(self.model.system_role)
    }

    /// `None` when tools are disabled.
    pub fn build_tool_set(&self, workdir: &Path) -> Option<ToolSet> {
        self.tools.enabled.then(|| {
            let config = CommonToolsConfig::default()
                .command_timeout(Duration::from_secs(self.tools.command_timeout_secs));
            ToolSet::new().with_common_tools_configured(workdir.to_string_lossy(), config)
        })
    }

    pub fn build_conversation_config(&self) -> ConversationConfig {
        ConversationConfig::new(self.model.name.clone(), self.agent.system_prompt.clone())
            .with_max_iterations(self.agent.max_iterations)
            .with_history_window(self.agent.history_window)
            .with_streaming(self.agent.stream)
            .with_project_context(self.agent.load_project_context)
            .with_generation(self.generation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_rs::capability::ModelCategory;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.model.provider, Provider::Ollama);
        assert_eq!(config.model.timeout_secs, 300);
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.history_dir, PathBuf::from("./history"));
        assert!(config.tools.enabled);
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn parses_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tandem.toml");
        fs::write(
            &path,
            r#"
[model]
provider = "lmstudio"
name = "qwen2.5-coder-7b-instruct"
system_role = true

[generation]
temperature = 0.1
top_k = 20

[agent]
max_iterations = 8
save_history = false

[tools]
enabled = false

[[models]]
family = "my-finetune"
max_context = 16384
max_generation = 4096
category = "code"
temperature = 0.15
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.model.provider, Provider::LmStudio);
        assert_eq!(config.base_url(), "http://localhost:1234");
        assert_eq!(config.generation.temperature, Some(0.1));
        assert_eq!(config.generation.top_k, Some(20));
        assert_eq!(config.agent.max_iterations, 8);
        assert!(!config.agent.save_history);
        assert!(config.agent.stream);
        assert!(config.build_tool_set(dir.path()).is_none());

        let caps = config
            .build_estimator()
            .estimate_offline(Provider::LmStudio, "my-finetune-q4");
        assert_eq!(caps.max_context_tokens(), 16_384);
        assert_eq!(caps.category(), ModelCategory::Code);
        assert!(caps.supports_system_role());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = AppConfig::default();
        config.generation.temperature = Some(2.5);
        match config.validate() {
            Err(ConfigError::Invalid { field, allowed, .. }) => {
                assert_eq!(field, "generation.temperature");
                assert_eq!(allowed, "0..=2");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }

        let mut config = AppConfig::default();
        config.agent.max_iterations = 21;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "agent.max_iterations", .. })
        ));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tandem.toml");
        fs::write(&path, "[model\nname = 1").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn conversation_config_follows_file() {
        let mut config = AppConfig::default();
        config.agent.history_window = 4;
        config.agent.stream = false;
        config.generation.max_tokens = Some(512);
        let conv = config.build_conversation_config();
        assert_eq!(conv.model, "llama3.2");
        assert_eq!(conv.history_window(), 4);
        assert!(!conv.stream);
        assert_eq!(conv.generation.max_tokens, Some(512));
    }

    #[test]
    fn tool_set_uses_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let tools = AppConfig::default().build_tool_set(dir.path()).unwrap();
        assert!(tools.contains("read_file"));
        assert!(tools.contains("execute_command"));
    }
}
