//! Summarizer configuration stored in `summarizer.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::reasoning::ReasoningTags;
use crate::error::ConfigurationError;

pub const DEFAULT_CONFIG_PATH: &str = "summarizer.toml";

/// Summarizer configuration (TOML).
///
/// This file is intended to be edited by humans. Every section and field is
/// optional; missing fields default to values that work against a local
/// LM Studio instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SummarizerConfig {
    pub oracle: OracleConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
}

/// Generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Completion token cap; unset lets the server decide.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Per-request ceiling in seconds. Slow local inference needs minutes.
    pub timeout_secs: u64,
    pub reasoning_open_tag: String,
    pub reasoning_close_tag: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let tags = ReasoningTags::default();
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "medgemma-1.5-4b-it".to_string(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: 300,
            reasoning_open_tag: tags.open,
            reasoning_close_tag: tags.close,
        }
    }
}

impl OracleConfig {
    pub fn reasoning_tags(&self) -> ReasoningTags {
        ReasoningTags {
            open: self.reasoning_open_tag.clone(),
            close: self.reasoning_close_tag.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Planning loop and session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on plan-update cycles per agent run.
    pub max_iterations: u32,
    /// Where plan, blackboard and iteration logs are written.
    pub artifacts_dir: PathBuf,
    /// Byte budget for the user part of planner/dispatcher prompts.
    pub prompt_budget_bytes: usize,
    /// Overall wall-clock budget for one session (completion or agent run).
    pub session_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            artifacts_dir: PathBuf::from(".summarizer"),
            prompt_budget_bytes: 60_000,
            session_timeout_secs: 30 * 60,
        }
    }
}

impl AgentConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

/// Tool collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Command for an external stdio tool server (e.g.
    /// `["summarizer", "serve-tools"]`). Empty runs tools in-process.
    pub command: Vec<String>,
    /// Directory relative tool paths resolve against.
    pub root: PathBuf,
    /// Where the tool server's stderr is captured.
    pub log_path: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            root: PathBuf::from("."),
            log_path: PathBuf::from(".summarizer/tool_server.log"),
        }
    }
}

impl SummarizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.oracle.base_url.trim().is_empty() {
            return invalid("oracle.base_url must not be empty");
        }
        if self.oracle.model.trim().is_empty() {
            return invalid("oracle.model must not be empty");
        }
        if self.oracle.timeout_secs == 0 {
            return invalid("oracle.timeout_secs must be > 0");
        }
        if self.oracle.reasoning_open_tag.is_empty() || self.oracle.reasoning_close_tag.is_empty()
        {
            return invalid("oracle reasoning tags must not be empty");
        }
        if self.agent.max_iterations == 0 {
            return invalid("agent.max_iterations must be > 0");
        }
        if self.agent.prompt_budget_bytes == 0 {
            return invalid("agent.prompt_budget_bytes must be > 0");
        }
        if self.agent.session_timeout_secs == 0 {
            return invalid("agent.session_timeout_secs must be > 0");
        }
        if !self.tools.command.is_empty() && self.tools.command[0].trim().is_empty() {
            return invalid("tools.command must start with a program name");
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Result<()> {
    Err(ConfigurationError::Invalid(msg.to_string()).into())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SummarizerConfig::default()`.
pub fn load_config(path: &Path) -> Result<SummarizerConfig> {
    if !path.exists() {
        let cfg = SummarizerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SummarizerConfig = toml::from_str(&contents)
        .map_err(|err| ConfigurationError::Invalid(format!("parse {}: {err}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SummarizerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
