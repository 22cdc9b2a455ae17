use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub provider_url: Option<String>,
    pub provider_timeout_sec: Option<u64>,
    pub metrics_port: Option<u16>,
    pub poll_interval_ms: Option<u64>,

    // Feature configs
    pub gateway: Option<GatewayConfig>,
    pub cache: Option<CacheConfig>,
    pub tempo: Option<TempoConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: Option<u64>,
    pub max_entries: Option<usize>,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TempoConfig {
    pub min_bpm: Option<f64>,
    pub max_bpm: Option<f64>,
    pub fallback_bpm: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
