//! Compiler configuration stored in `compiler.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::gateway::{BackoffPolicy, CompletionSettings};

/// Compiler configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to
/// `CompilerConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Completion model identifier.
    pub model: String,
    pub temperature: f32,
    /// Upper bound on generated tokens per completion.
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub best_of: u32,

    /// API root of the completion service.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Truncate page HTML in element-discovery prompts beyond this many bytes.
    pub html_budget_bytes: usize,

    pub retry: RetryConfig,
}

/// Rate-limit backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub backoff_secs: u64,
    /// Growth factor per retry; `1` keeps the delay fixed.
    pub multiplier: u32,
    /// Total completion calls allowed per prompt, including the first.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 10,
            multiplier: 1,
            max_attempts: 5,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            model: "text-davinci-003".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            best_of: 3,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            html_budget_bytes: 60_000,
            retry: RetryConfig::default(),
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.max_tokens == 0 {
            return Err(anyhow!("max_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!("temperature must be within 0.0..=2.0"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(anyhow!("top_p must be within 0.0..=1.0"));
        }
        if self.best_of == 0 {
            return Err(anyhow!("best_of must be > 0"));
        }
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url must be non-empty"));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(anyhow!("api_key_env must be non-empty"));
        }
        if self.html_budget_bytes == 0 {
            return Err(anyhow!("html_budget_bytes must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.retry.multiplier == 0 {
            return Err(anyhow!("retry.multiplier must be > 0"));
        }
        Ok(())
    }

    /// Request parameters the gateway sends with every prompt.
    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            best_of: self.best_of,
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_secs(self.retry.backoff_secs),
            multiplier: self.retry.multiplier,
            max_attempts: self.retry.max_attempts,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CompilerConfig::default()`.
pub fn load_config(path: &Path) -> Result<CompilerConfig> {
    if !path.exists() {
        let cfg = CompilerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CompilerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CompilerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
