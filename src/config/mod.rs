mod file_config;

pub use file_config::{CacheConfig, FileConfig, GatewayConfig, TempoConfig};

use anyhow::{bail, Result};
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub provider_url: Option<String>,
    pub provider_timeout_sec: u64,
    pub metrics_port: u16,
    pub poll_interval_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            provider_url: None,
            provider_timeout_sec: 10,
            metrics_port: 9091,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Core settings
    pub provider_url: String,
    pub provider_timeout_sec: u64,
    pub metrics_port: u16,
    pub poll_interval: Duration,

    // Subsystem settings (with defaults)
    pub gateway: GatewaySettings,
    pub cache: CacheSettings,
    pub tempo: TempoSettings,
}

impl EngineConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let provider_url = file
            .provider_url
            .or_else(|| cli.provider_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("provider_url must be specified via --provider-url or config file")
            })?;

        let provider_timeout_sec = file.provider_timeout_sec.unwrap_or(cli.provider_timeout_sec);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let poll_interval_ms = file.poll_interval_ms.unwrap_or(cli.poll_interval_ms);
        if poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }

        let gw_file = file.gateway.unwrap_or_default();
        let gateway = GatewaySettings {
            max_attempts: gw_file.max_attempts.unwrap_or(3),
            retry_delay: Duration::from_millis(gw_file.retry_delay_ms.unwrap_or(400)),
        };
        if gateway.max_attempts == 0 {
            bail!("gateway.max_attempts must be at least 1");
        }

        let cache_file = file.cache.unwrap_or_default();
        let cache = CacheSettings {
            ttl: Duration::from_secs(cache_file.ttl_secs.unwrap_or(600)),
            max_entries: cache_file.max_entries.unwrap_or(256),
            sweep_interval: Duration::from_secs(cache_file.sweep_interval_secs.unwrap_or(60)),
        };
        if cache.max_entries == 0 {
            bail!("cache.max_entries must be greater than zero");
        }

        let tempo_file = file.tempo.unwrap_or_default();
        let tempo = TempoSettings {
            min_bpm: tempo_file.min_bpm.unwrap_or(60.0),
            max_bpm: tempo_file.max_bpm.unwrap_or(180.0),
            fallback_bpm: tempo_file.fallback_bpm.unwrap_or(75.0),
        };
        if tempo.min_bpm >= tempo.max_bpm {
            bail!(
                "tempo.min_bpm ({}) must be below tempo.max_bpm ({})",
                tempo.min_bpm,
                tempo.max_bpm
            );
        }
        if tempo.fallback_bpm < tempo.min_bpm || tempo.fallback_bpm > tempo.max_bpm {
            bail!(
                "tempo.fallback_bpm ({}) must be within [{}, {}]",
                tempo.fallback_bpm,
                tempo.min_bpm,
                tempo.max_bpm
            );
        }

        Ok(Self {
            provider_url,
            provider_timeout_sec,
            metrics_port,
            poll_interval: Duration::from_millis(poll_interval_ms),
            gateway,
            cache,
            tempo,
        })
    }
}

/// Retry behavior for provider fetches.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(400),
        }
    }
}

/// TTL cache sizing and sweep cadence.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_entries: usize,
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_entries: 256,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// BPM bounds and fallback for the tempo synthesizer.
#[derive(Debug, Clone)]
pub struct TempoSettings {
    pub min_bpm: f64,
    pub max_bpm: f64,
    pub fallback_bpm: f64,
}

impl Default for TempoSettings {
    fn default() -> Self {
        Self {
            min_bpm: 60.0,
            max_bpm: 180.0,
            fallback_bpm: 75.0,
        }
    }
}
