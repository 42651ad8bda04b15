use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Workspace opened at start-up; `workspace.select` can still switch it.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub default_taken_by: Option<String>,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_retry_max_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

fn default_retry_base_delay_ms() -> u64 {
    RetryPolicy::default().base_delay_ms
}

fn default_retry_max_delay_ms() -> u64 {
    RetryPolicy::default().max_delay_ms
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            workspace: None,
            log_filter: default_log_filter(),
            default_taken_by: None,
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl AppConfig {
    /// `attendanced.toml` in the working directory (optional), then
    /// `ATTENDANCED_*` environment variables.
    pub fn load() -> Result<AppConfig, ConfigError> {
        Config::builder()
            .add_source(ConfigFile::with_name("attendanced").required(false))
            .add_source(Environment::with_prefix("ATTENDANCED").try_parsing(true))
            .build()?
            .try_deserialize::<AppConfig>()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
        }
    }
}
