//! Run configuration.
//!
//! Loads and validates `permeval.json` and turns it into a backend. Every
//! field has a default, so the file is optional; CLI flags override it.
use crate::backend::gemini::DEFAULT_BASE_URL;
use crate::backend::{CommandBackend, GeminiBackend, ModelBackend, RetryPolicy};
use crate::driver::{DEFAULT_CHECKIN_INTERVAL, DEFAULT_CHECKPOINT_INTERVAL};
use crate::evaluate::DEFAULT_GROUNDING_MAX_ATTEMPTS;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_PATH: &str = "permeval.json";
/// Selects the command backend when set; overrides the config file.
pub const LM_COMMAND_ENV: &str = "PERMEVAL_LM_COMMAND";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub schema_version: u32,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    #[serde(default = "default_checkin_interval_secs")]
    pub checkin_interval_secs: u64,
    #[serde(default = "default_grounding_max_attempts")]
    pub grounding_max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Gemini {
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Shell-style command line; see `backend::command`.
    Command { command: String },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Gemini {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            statuses: policy.retry_statuses,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            retry_statuses: self.statuses.clone(),
        }
    }
}

impl RunConfig {
    pub fn checkin_interval(&self) -> Duration {
        Duration::from_secs(self.checkin_interval_secs)
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("data/checkpoints")
}

fn default_checkpoint_interval() -> usize {
    DEFAULT_CHECKPOINT_INTERVAL
}

fn default_checkin_interval_secs() -> u64 {
    DEFAULT_CHECKIN_INTERVAL.as_secs()
}

fn default_grounding_max_attempts() -> u32 {
    DEFAULT_GROUNDING_MAX_ATTEMPTS
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Config used when no file is present.
pub fn default_config() -> RunConfig {
    RunConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        model: default_model(),
        backend: BackendConfig::default(),
        retry: RetryConfig::default(),
        checkpoint_dir: default_checkpoint_dir(),
        checkpoint_interval: default_checkpoint_interval(),
        checkin_interval_secs: default_checkin_interval_secs(),
        grounding_max_attempts: default_grounding_max_attempts(),
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: RunConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    validate_config(&config).with_context(|| format!("validate config {}", path.display()))?;
    Ok(config)
}

/// Explicit path must exist; otherwise `permeval.json` is read if present.
pub fn resolve_config(explicit: Option<&Path>) -> Result<RunConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.is_file() {
                load_config(path)
            } else {
                Ok(default_config())
            }
        }
    }
}

pub fn validate_config(config: &RunConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.model.trim().is_empty() {
        return Err(anyhow!("model must be non-empty"));
    }
    if config.checkpoint_interval == 0 {
        return Err(anyhow!("checkpoint_interval must be at least 1"));
    }
    if config.checkin_interval_secs == 0 {
        return Err(anyhow!("checkin_interval_secs must be at least 1"));
    }
    if config.grounding_max_attempts == 0 {
        return Err(anyhow!("grounding_max_attempts must be at least 1"));
    }
    match &config.backend {
        BackendConfig::Command { command } if command.trim().is_empty() => {
            return Err(anyhow!("backend.command must be non-empty"));
        }
        BackendConfig::Gemini { api_key_env, .. } if api_key_env.trim().is_empty() => {
            return Err(anyhow!("backend.api_key_env must be non-empty"));
        }
        _ => {}
    }
    Ok(())
}

/// Pick the backend: CLI flag, then `PERMEVAL_LM_COMMAND`, then the config.
pub fn resolve_backend(
    config: &BackendConfig,
    cli_command: Option<&str>,
    env_command: Option<String>,
) -> BackendConfig {
    let from_env = env_command.filter(|command| !command.trim().is_empty());
    match cli_command.map(str::to_string).or(from_env) {
        Some(command) => BackendConfig::Command { command },
        None => config.clone(),
    }
}

pub fn build_backend(config: &RunConfig, cli_command: Option<&str>) -> Result<Box<dyn ModelBackend>> {
    let selected = resolve_backend(
        &config.backend,
        cli_command,
        std::env::var(LM_COMMAND_ENV).ok(),
    );
    match selected {
        BackendConfig::Command { command } => {
            tracing::info!(command = %command, "using command backend");
            Ok(Box::new(CommandBackend::new(&command)?))
        }
        BackendConfig::Gemini {
            api_key_env,
            base_url,
            timeout_secs,
        } => {
            let api_key = std::env::var(&api_key_env)
                .map_err(|_| anyhow!("{api_key_env} is not set; export it or pass --lm-command"))?;
            tracing::info!(base_url = %base_url, "using gemini backend");
            Ok(Box::new(GeminiBackend::new(
                api_key,
                &base_url,
                Duration::from_secs(timeout_secs),
            )?))
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
