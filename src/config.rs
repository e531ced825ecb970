use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub scraper: ScraperConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub origin: OriginConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_max_gameweek")]
    pub max_gameweek: u32,
    #[serde(default = "default_gameday_interval")]
    pub gameday_interval_secs: u64,
    #[serde(default = "default_non_gameday_interval")]
    pub non_gameday_interval_secs: u64,
    /// When > 0, overrides the game-day heuristic with a fixed interval.
    #[serde(default)]
    pub static_interval_secs: u64,
    /// League entry ids whose squads are scraped each cycle.
    pub entries: Vec<u64>,
}

fn default_active() -> bool {
    true
}
fn default_max_gameweek() -> u32 {
    38
}
fn default_gameday_interval() -> u64 {
    120
}
fn default_non_gameday_interval() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Blob-store upload endpoint; the target blob name goes in the `name` query param.
    pub endpoint: String,
    /// Public base URL under which uploaded blobs are served. Must end with `/`.
    pub public_base: String,
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
}

fn default_upload_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct OriginConfig {
    #[serde(default = "default_origin_base")]
    pub base_url: String,
    #[serde(default = "default_origin_timeout")]
    pub timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: default_origin_base(),
            timeout_secs: default_origin_timeout(),
        }
    }
}

fn default_origin_base() -> String {
    "https://fantasy.premierleague.com/api".to_string()
}
fn default_origin_timeout() -> u64 {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate scraper
    if config.scraper.max_gameweek == 0 || config.scraper.max_gameweek > 38 {
        anyhow::bail!("scraper.max_gameweek must be in 1..=38");
    }
    if config.scraper.gameday_interval_secs == 0 {
        anyhow::bail!("scraper.gameday_interval_secs must be >= 1");
    }
    if config.scraper.non_gameday_interval_secs == 0 {
        anyhow::bail!("scraper.non_gameday_interval_secs must be >= 1");
    }
    if config.scraper.entries.is_empty() {
        anyhow::bail!("scraper.entries must list at least one entry id");
    }

    // Validate upload
    if !config.upload.public_base.ends_with('/') {
        anyhow::bail!("upload.public_base must end with '/'");
    }

    Ok(config)
}
