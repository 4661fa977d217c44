use anyhow::{Context, Result};
use serde::Deserialize;
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub store: Store,
    pub report: Report,
    pub explorer: Explorer,
    pub schedule: Schedule,
    #[serde(default)]
    pub observability: Observability,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Explorer {
    pub base_url: String,
    /// The escrow contract: lock transfers land here and its balance is reported.
    pub contract_address: String,
    pub lock_token: String,
    /// Contract whose logs carry `Voted` events.
    pub vote_contract_address: String,
    pub voted_topic: String,
    pub request_timeout_secs: u64,
    pub page_delay_ms: u64,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Schedule {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Observability {
    pub prometheus_port: Option<u16>,
}

impl Config {
    /// Reads `TRACKER_CONFIG` if set, else [`DEFAULT_CONFIG_PATH`].
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("TRACKER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse tracker config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.explorer.base_url.starts_with("http://")
                || self.explorer.base_url.starts_with("https://"),
            "explorer.base_url must be an http(s) URL"
        );
        anyhow::ensure!(
            is_hex_address(&self.explorer.contract_address),
            "explorer.contract_address must be a 0x-prefixed 20-byte hex address"
        );
        anyhow::ensure!(
            is_hex_address(&self.explorer.vote_contract_address),
            "explorer.vote_contract_address must be a 0x-prefixed 20-byte hex address"
        );
        anyhow::ensure!(
            self.explorer.voted_topic.len() == 66 && self.explorer.voted_topic.starts_with("0x"),
            "explorer.voted_topic must be a 0x-prefixed 32-byte hex topic"
        );
        anyhow::ensure!(
            self.explorer.request_timeout_secs > 0,
            "explorer.request_timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.schedule.interval_secs > 0,
            "schedule.interval_secs must be > 0"
        );
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

fn is_hex_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}
