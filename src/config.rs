use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::graph::AttributeScope;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedsConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// Substring of a feed file name marking the most recent batch.
    #[serde(default = "default_recent_marker")]
    pub recent_marker: String,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            include_globs: default_include_globs(),
            output_prefix: default_output_prefix(),
            recent_marker: default_recent_marker(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data/json")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("data/filtered")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.json".to_string()]
}
fn default_output_prefix() -> String {
    "compressed-".to_string()
}
fn default_recent_marker() -> String {
    "2024".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_graph_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub attribute_nodes: AttributeScope,
    /// A previously persisted graph to compare the fresh build against.
    #[serde(default)]
    pub baseline: Option<PathBuf>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: default_graph_path(),
            attribute_nodes: AttributeScope::default(),
            baseline: None,
        }
    }
}

fn default_graph_path() -> PathBuf {
    PathBuf::from("graph_store.kg")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_chat_model(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

impl ChatConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_chat_model() -> String {
    "llama3.2:1b".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_chat_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub corpus: Option<PathBuf>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            corpus: None,
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

impl Config {
    /// All-default configuration, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.feeds.output_prefix.is_empty() {
        anyhow::bail!("feeds.output_prefix must not be empty");
    }
    if config.feeds.recent_marker.is_empty() {
        anyhow::bail!("feeds.recent_marker must not be empty");
    }
    if config.feeds.include_globs.is_empty() {
        anyhow::bail!("feeds.include_globs must list at least one pattern");
    }

    if config.retrieval.top_n < 1 {
        anyhow::bail!("retrieval.top_n must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.chat.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown chat provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.chat.is_enabled() && config.chat.model.trim().is_empty() {
        anyhow::bail!("chat.model must not be empty");
    }

    Ok(())
}
