//! TOML configuration loading and validation.
//!
//! Every section except `[db]` has defaults, so a minimal file is:
//!
//! ```toml
//! [db]
//! path = "./data/askbase.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use askbase_core::matcher::{MatchMode, DEFAULT_THRESHOLD};
use askbase_core::prompt::{TemplateId, TemplateRegistry};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// Template name → path of a file replacing the built-in body.
    #[serde(default)]
    pub prompts: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Chat completions endpoint. Defaults to the OpenAI API.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: default_llm_model(),
            temperature: default_temperature(),
            url: None,
            max_retries: 5,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub mode: MatchMode,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            mode: MatchMode::default(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_max_turns")]
    pub max_turns: i64,
    #[serde(default = "default_relevance_min_overlap")]
    pub relevance_min_overlap: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            max_turns: default_max_turns(),
            relevance_min_overlap: default_relevance_min_overlap(),
        }
    }
}

fn default_window_hours() -> i64 {
    24
}
fn default_max_turns() -> i64 {
    10
}
fn default_relevance_min_overlap() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default = "default_support_contact")]
    pub support_contact: String,
    /// Language the question corpus is written in.
    #[serde(default = "default_canonical_language")]
    pub canonical_language: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            support_contact: default_support_contact(),
            canonical_language: default_canonical_language(),
        }
    }
}

fn default_assistant_name() -> String {
    "the support assistant".to_string()
}
fn default_support_contact() -> String {
    "our customer support team".to_string()
}
fn default_canonical_language() -> String {
    "English".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: default_notify_provider(),
            url: None,
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

fn default_notify_provider() -> String {
    "none".to_string()
}
fn default_notify_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Built-in templates with the `[prompts]` overrides applied and
    /// validated. Relative paths resolve against `base_dir`.
    pub fn template_registry(&self, base_dir: &Path) -> Result<TemplateRegistry> {
        let mut registry = TemplateRegistry::builtin();
        for (name, path) in &self.prompts {
            let id: TemplateId = name
                .parse()
                .map_err(|e: String| anyhow::anyhow!("[prompts] {}", e))?;
            let path = if path.is_relative() {
                base_dir.join(path)
            } else {
                path.clone()
            };
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;
            registry = registry.with_override(id, body);
        }
        registry
            .validate()
            .with_context(|| "Invalid prompt template override")?;
        Ok(registry)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if !(0.0..=1.0).contains(&config.retrieval.threshold) {
        anyhow::bail!("retrieval.threshold must be in [0.0, 1.0]");
    }

    // Validate history
    if config.history.window_hours < 1 {
        anyhow::bail!("history.window_hours must be >= 1");
    }
    if config.history.max_turns < 1 {
        anyhow::bail!("history.max_turns must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.history.relevance_min_overlap) {
        anyhow::bail!("history.relevance_min_overlap must be in [0.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    // Validate notify
    match config.notify.provider.as_str() {
        "none" => {}
        "webhook" => {
            if config.notify.url.is_none() {
                anyhow::bail!("notify.url must be set when provider is 'webhook'");
            }
        }
        other => anyhow::bail!(
            "Unknown notify provider: '{}'. Must be none or webhook.",
            other
        ),
    }

    Ok(config)
}
