use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub working_dir: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Signs presigned blob URLs; override outside development.
    #[serde(default = "default_secret")]
    pub secret_key: String,
    #[serde(default = "default_url_ttl")]
    pub url_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Degree of parallelism between documents; stages within one document
    /// always run sequentially.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// How often a failed document is retried end to end.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// `stub` or `claude`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Populated from `ANTHROPIC_API_KEY`, never from the config file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_bucket() -> String {
    "documents".to_string()
}

fn default_secret() -> String {
    "dev-secret-key-change-in-production".to_string()
}

fn default_url_ttl() -> i64 {
    3600
}

fn default_workers() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_provider() -> String {
    "stub".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            secret_key: default_secret(),
            url_ttl_secs: default_url_ttl(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
        }
    }
}

impl AppConfig {
    pub fn working_dir(&self) -> PathBuf {
        PathBuf::from(&self.working_dir)
    }
}

pub async fn load_config() -> Result<AppConfig> {
    let path = config_path();
    let contents = fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let mut config: AppConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    config.llm.api_key = env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty());
    info!(path = %path.display(), "configuration loaded from disk");
    Ok(config)
}

fn config_path() -> PathBuf {
    env::var("APP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
