use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::vocabulary::Vocabulary;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub shopgraph: ShopgraphConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub pruning: PruningConfig,
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

/// Store location and traversal settings
#[derive(Debug, Clone, Deserialize)]
pub struct ShopgraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Traversal depth: 1, 2, or 3 and above.
    #[serde(default = "default_max_degree")]
    pub max_degree: usize,
}

/// Chat-completions endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    #[serde(default = "default_parse_timeout_secs")]
    pub parse_timeout_secs: u64,
    #[serde(default = "default_prune_timeout_secs")]
    pub prune_timeout_secs: u64,
    #[serde(default = "default_parse_max_tokens")]
    pub parse_max_tokens: u32,
    #[serde(default = "default_prune_max_tokens")]
    pub prune_max_tokens: u32,
    #[serde(default = "default_parse_temperature")]
    pub parse_temperature: f32,
    #[serde(default = "default_prune_temperature")]
    pub prune_temperature: f32,
}

/// Limits applied by the pruning stage
#[derive(Debug, Clone, Deserialize)]
pub struct PruningConfig {
    /// Items per category shown to the model.
    #[serde(default = "default_prompt_items")]
    pub prompt_items: usize,
    #[serde(default = "default_important_cap")]
    pub important_cap: usize,
    #[serde(default = "default_user_group_cap")]
    pub user_group_cap: usize,
    #[serde(default = "default_category_cap")]
    pub default_cap: usize,
    /// Minimum kept items for a category with at least one scoring item.
    #[serde(default = "default_retention_floor")]
    pub retention_floor: usize,
    /// Items kept for an important category where nothing scored.
    #[serde(default = "default_important_fallback")]
    pub important_fallback: usize,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            prompt_items: default_prompt_items(),
            important_cap: default_important_cap(),
            user_group_cap: default_user_group_cap(),
            default_cap: default_category_cap(),
            retention_floor: default_retention_floor(),
            important_fallback: default_important_fallback(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_degree() -> usize {
    2
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_parse_timeout_secs() -> u64 {
    15
}

fn default_prune_timeout_secs() -> u64 {
    20
}

fn default_parse_max_tokens() -> u32 {
    800
}

fn default_prune_max_tokens() -> u32 {
    1000
}

fn default_parse_temperature() -> f32 {
    0.1
}

fn default_prune_temperature() -> f32 {
    0.2
}

fn default_prompt_items() -> usize {
    15
}

fn default_important_cap() -> usize {
    12
}

fn default_user_group_cap() -> usize {
    8
}

fn default_category_cap() -> usize {
    6
}

fn default_retention_floor() -> usize {
    3
}

fn default_important_fallback() -> usize {
    5
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in SHOPGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("SHOPGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_file(&config_path)
    }

    /// Parse and validate a specific config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.shopgraph.max_degree == 0 {
            anyhow::bail!("shopgraph.max_degree must be at least 1");
        }

        if self.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must not be empty");
        }

        if self.llm.base_url.trim().is_empty() {
            anyhow::bail!("llm.base_url must not be empty");
        }

        if self.llm.parse_timeout_secs == 0 || self.llm.prune_timeout_secs == 0 {
            anyhow::bail!("llm timeouts must be greater than 0");
        }

        let p = &self.pruning;
        if p.prompt_items == 0
            || p.important_cap == 0
            || p.user_group_cap == 0
            || p.default_cap == 0
            || p.important_fallback == 0
        {
            anyhow::bail!("pruning limits must be greater than 0");
        }

        self.vocabulary
            .validate()
            .context("Invalid [vocabulary] section")?;

        Ok(())
    }

    /// Bearer token for the completion endpoint. A missing variable is not an
    /// error: the pipeline then runs on its deterministic fallbacks.
    pub fn llm_api_key(&self) -> Option<String> {
        std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.shopgraph.db_path
    }
}
