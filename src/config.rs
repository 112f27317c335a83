use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::transfer::{TickInterval, TransferOptions};

pub const TOKEN_ENV: &str = "VOLCP_API_TOKEN";
const DEFAULT_API_URL: &str = "https://api.volc.example.com/";
const DEFAULT_REGION: &str = "cn-beijing";

/// Persistent settings stored in `~/.volcp/config.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub project_id: String,
    pub region: String,
    pub api_token: String,
    pub part_size_mib: u64,
    pub max_concurrent_uploads: usize,
    pub max_retry_attempts: usize,
    pub initial_retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let opts = TransferOptions::default();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            project_id: String::new(),
            region: DEFAULT_REGION.to_string(),
            api_token: String::new(),
            part_size_mib: opts.part_size / (1024 * 1024),
            max_concurrent_uploads: opts.max_concurrent_uploads,
            max_retry_attempts: opts.max_retry_attempts,
            initial_retry_delay_ms: opts.initial_retry_delay.as_millis() as u64,
        }
    }
}

/// `~/.volcp`, the home of config and logs.
pub fn storage_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("cannot find user's home dir")?;
    Ok(home.join(".".to_owned() + env!("CARGO_PKG_NAME")))
}

impl Config {
    /// Load the user config, writing a default one on first use, then apply
    /// environment overrides.
    pub fn init() -> anyhow::Result<Self> {
        let dir = storage_dir()?;
        let path = dir.join("config.json");
        if !path.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            Config::default().save_to(&path)?;
        }
        let mut config = Config::read_from(&path)?;
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.trim().is_empty()
        {
            config.api_token = token;
        }
        Ok(config)
    }

    pub fn read_from(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Credentials and project are needed before any remote call.
    pub fn ensure_ready(&self) -> anyhow::Result<()> {
        if self.api_token.trim().is_empty() {
            bail!("no API token configured; set {} or api_token in the config file", TOKEN_ENV);
        }
        if self.project_id.trim().is_empty() {
            bail!("no project configured; set project_id in the config file");
        }
        Ok(())
    }

    pub fn transfer_options(&self, simple: bool) -> TransferOptions {
        TransferOptions {
            part_size: self.part_size_mib.saturating_mul(1024 * 1024),
            max_concurrent_uploads: self.max_concurrent_uploads,
            max_retry_attempts: self.max_retry_attempts,
            initial_retry_delay: Duration::from_millis(self.initial_retry_delay_ms),
            tick: if simple {
                TickInterval::Simple
            } else {
                TickInterval::Interactive
            },
        }
    }
}
