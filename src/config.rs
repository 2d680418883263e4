//! TOML configuration for the `grow` binary.
//!
//! # Example
//!
//! ```toml
//! [history]
//! path = "./data/plant_data.json"
//! mirror_key = "plant_data.json"
//!
//! [plant]
//! name = "Cucumber"
//!
//! [series]
//! default_limit = 30
//!
//! [mirror]
//! bucket = "greenhouse"
//! region = "eu-west-1"
//!
//! [notifier]
//! webhook_url = "http://localhost:5500/api/plant_growth"
//! timeout_secs = 2
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub history: HistoryConfig,
    #[serde(default)]
    pub plant: PlantConfig,
    #[serde(default)]
    pub series: SeriesConfig,
    #[serde(default)]
    pub mirror: Option<S3Config>,
    #[serde(default)]
    pub notifier: Option<NotifierConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub path: PathBuf,
    #[serde(default = "default_mirror_key")]
    pub mirror_key: String,
}

fn default_mirror_key() -> String {
    "plant_data.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlantConfig {
    #[serde(default = "default_plant_name")]
    pub name: String,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            name: default_plant_name(),
        }
    }
}

fn default_plant_name() -> String {
    "Cucumber".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeriesConfig {
    #[serde(default = "default_series_limit")]
    pub default_limit: usize,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            default_limit: default_series_limit(),
        }
    }
}

fn default_series_limit() -> usize {
    30
}

/// Location of an S3 bucket (or S3-compatible service).
#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for MinIO, LocalStack and friends.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    2
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.history.path.as_os_str().is_empty() {
        anyhow::bail!("history.path must not be empty");
    }

    if config.history.mirror_key.trim().is_empty() {
        anyhow::bail!("history.mirror_key must not be empty");
    }

    if config.plant.name.trim().is_empty() {
        anyhow::bail!("plant.name must not be empty");
    }

    if config.series.default_limit < 1 {
        anyhow::bail!("series.default_limit must be >= 1");
    }

    if let Some(ref mirror) = config.mirror {
        if mirror.bucket.is_empty() {
            anyhow::bail!("mirror.bucket must not be empty");
        }
    }

    if let Some(ref notifier) = config.notifier {
        if notifier.timeout_secs == 0 {
            anyhow::bail!("notifier.timeout_secs must be > 0");
        }
        if let Some(ref url) = notifier.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!(
                    "notifier.webhook_url must be an http(s) URL, got '{}'",
                    url
                );
            }
        }
    }

    Ok(())
}
