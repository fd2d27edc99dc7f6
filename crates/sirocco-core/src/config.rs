//! TOML configuration for the session loop and its budgets.

use std::path::Path;

use serde::Deserialize;
use sirocco_tools::{AuditConfig, ToolsConfig};

use crate::session::TokenBudget;

fn default_soft_threshold() -> usize {
    20_000
}

fn default_hard_ceiling() -> usize {
    80_000
}

fn default_keep_tail() -> usize {
    5
}

fn default_tool_output_limit() -> usize {
    2_000
}

fn default_max_restarts() -> u32 {
    2
}

fn default_max_turns() -> usize {
    40
}

fn default_llm_timeout() -> u64 {
    600
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}

fn default_model() -> String {
    "qwen2.5-coder".into()
}

fn default_provider_name() -> String {
    "compatible".into()
}

fn default_api_key_env() -> String {
    "SIROCCO_API_KEY".into()
}

fn default_max_tokens() -> u32 {
    8192
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Per-call wall-clock limit for provider requests, in seconds.
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,
}

/// Token thresholds that drive compaction, gating, and restarts.
#[derive(Debug, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_soft_threshold")]
    pub soft_threshold_tokens: usize,
    #[serde(default = "default_hard_ceiling")]
    pub hard_ceiling_tokens: usize,
    #[serde(default = "default_keep_tail")]
    pub keep_tail_count: usize,
    #[serde(default = "default_tool_output_limit")]
    pub tool_output_token_limit: usize,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider_name")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable the API key is read from, never the key itself.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            llm_timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            soft_threshold_tokens: default_soft_threshold(),
            hard_ceiling_tokens: default_hard_ceiling(),
            keep_tail_count: default_keep_tail(),
            tool_output_token_limit: default_tool_output_limit(),
            max_restarts: default_max_restarts(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider_name(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl BudgetConfig {
    #[must_use]
    pub fn budget(&self) -> TokenBudget {
        TokenBudget {
            soft_threshold: self.soft_threshold_tokens,
            hard_ceiling: self.hard_ceiling_tokens,
            keep_tail: self.keep_tail_count,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
